use chrono::Local;
use clap::{Command, CommandFactory, Parser};
use clap_complete::{generate, Generator};
use fir_accel::{cmd_args::Args, settings::Settings, FirSimResult, Stimulus, System};
use std::io;
fn print_completions<G: Generator>(gen: G, cmd: &mut Command) {
    generate(gen, cmd, cmd.get_name().to_string(), &mut io::stdout());
}

/// a name with glob characters is expanded, sorted, any other name is kept as is
fn expand_config_names(names: Vec<String>) -> Result<Vec<String>, Box<dyn std::error::Error>> {
    let mut config_names = vec![];
    for name in names {
        if name.contains(|c: char| matches!(c, '*' | '?' | '[')) {
            let mut matched = glob::glob(&name)?
                .map(|path| path.map(|p| p.to_string_lossy().into_owned()))
                .collect::<Result<Vec<_>, _>>()?;
            matched.sort();
            config_names.extend(matched);
        } else {
            config_names.push(name);
        }
    }
    Ok(config_names)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    simple_logger::init_with_level(log::Level::Info)?;
    let start_time = std::time::Instant::now();

    let mut config_names = vec![String::from("configs/default.toml")];
    let args = Args::parse();
    if let Some(generator) = args.generator {
        let mut cmd = Args::command();
        eprintln!("Generating completion file for {:?}...", generator);
        print_completions(generator, &mut cmd);
        return Ok(());
    }
    println!("{:?}", args);

    // config_names append args
    config_names.extend(expand_config_names(args.config_names)?);

    let mut results = FirSimResult::new();
    let settings = Settings::new(config_names)?;
    results.settings = Some(settings.clone());
    println!("{}", serde_json::to_string_pretty(&settings)?);
    // create the folder for output
    std::fs::create_dir_all("output")?;

    let stimulus = Stimulus::new(&settings.taps_path, &settings.inputs_path)?;
    let mut system = System::new(&settings, &stimulus)?;

    // run the system
    let mut stat = system.run()?;

    // record the simulation time
    let simulation_time = start_time.elapsed().as_secs();
    // record the result
    let seconds = simulation_time % 60;
    let minutes = (simulation_time / 60) % 60;
    let hours = (simulation_time / 60) / 60;
    let time_str = format!("{}:{}:{}", hours, minutes, seconds);
    stat.simulation_time = time_str;

    results.stats = Some(stat);
    let current_time: String = Local::now().format("%Y-%m-%d-%H-%M-%S%.6f").to_string();
    let output_path = format!("output/{}.json", current_time);

    println!("{}", serde_json::to_string_pretty(&results)?);
    // write json of results to output_path
    std::fs::write(output_path, serde_json::to_string_pretty(&results)?)?;
    Ok(())
}

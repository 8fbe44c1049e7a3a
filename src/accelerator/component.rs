/// # Description
/// every clocked part of the model implements this
/// * `cycle` is called exactly once per tick by the `System`
/// * a component may do at most one bank visible action inside one `cycle`
/// * `cycle` never blocks, waiting is expressed by staying in the same state
pub trait Component {
    fn cycle(&mut self) -> Result<(), Box<dyn std::error::Error>>;
}

use itertools::Itertools;

use crate::accelerator::fir_engine::TAPS;
use crate::error::SimError;

/// # Description
/// the data the driver feeds into the accelerator
/// * `taps`: the tap coefficients, `taps[0]` is lane 0 of the first tap register
/// * `inputs`: the input stream, one FIR batch per `TAPS` samples
#[derive(Debug, Clone, PartialEq)]
pub struct Stimulus {
    pub taps: [i16; TAPS],
    pub inputs: Vec<i16>,
}

impl Stimulus {
    ///
    /// # Arguments
    /// * taps_path - file with exactly `TAPS` signed integers
    /// * inputs_path - file with a multiple of `TAPS` signed integers
    ///
    /// # Description
    /// numbers are separated by whitespace, everything after a `#` is a comment
    /// example file format:
    /// ```text
    /// # first batch
    /// 0 88 110 76 49 50 38 -26
    /// -110 -138 -87 -12 24 26 49 100
    /// ```
    pub fn new(taps_path: &str, inputs_path: &str) -> Result<Self, SimError> {
        let taps = read_samples(taps_path)?;
        let inputs = read_samples(inputs_path)?;
        Self::checked(&taps, inputs, &format!("{} / {}", taps_path, inputs_path))
    }

    /// same checks as `new`, for samples that never were in a file
    pub fn from_samples(taps: &[i16], inputs: Vec<i16>) -> Result<Self, SimError> {
        Self::checked(taps, inputs, "in-memory samples")
    }

    fn checked(taps: &[i16], inputs: Vec<i16>, path: &str) -> Result<Self, SimError> {
        let invalid = |reason: String| SimError::Stimulus {
            path: path.to_string(),
            reason,
        };
        let taps: [i16; TAPS] = taps
            .try_into()
            .map_err(|_| invalid(format!("expected {} taps, got {}", TAPS, taps.len())))?;
        if inputs.is_empty() || inputs.len() % TAPS != 0 {
            return Err(invalid(format!(
                "the number of inputs must be a non-zero multiple of {}, got {}",
                TAPS,
                inputs.len()
            )));
        }
        Ok(Stimulus { taps, inputs })
    }

    pub fn batches(&self) -> impl Iterator<Item = &[i16]> {
        self.inputs.chunks(TAPS)
    }

    pub fn num_batches(&self) -> usize {
        self.inputs.len() / TAPS
    }

    pub fn reference(&self) -> Vec<i16> {
        reference_fir(&self.taps, &self.inputs)
    }
}

fn read_samples(path: &str) -> Result<Vec<i16>, SimError> {
    let contents = std::fs::read_to_string(path).map_err(|e| SimError::Stimulus {
        path: path.to_string(),
        reason: e.to_string(),
    })?;
    contents
        .lines()
        .map(|line| line.split('#').next().unwrap_or(""))
        .flat_map(|line| line.split_whitespace())
        .map(|num| num.parse::<i16>())
        .try_collect()
        .map_err(|e| SimError::Stimulus {
            path: path.to_string(),
            reason: e.to_string(),
        })
}

/// # Description
/// the streaming filter the accelerator computes batch by batch:
/// `y[t] = sum(w[m] * x[t + m + 1 - TAPS])`, samples before the stream are zero,
/// 16 bit wrapping arithmetic
///
/// # Example
/// ```
/// use fir_accel::stimulus::reference_fir;
/// let mut taps = [0i16; 16];
/// taps[15] = 1;
/// let inputs: Vec<i16> = (1..=32).collect();
/// assert_eq!(reference_fir(&taps, &inputs), inputs);
/// ```
pub fn reference_fir(taps: &[i16; TAPS], inputs: &[i16]) -> Vec<i16> {
    (0..inputs.len())
        .map(|t| {
            taps.iter().enumerate().fold(0i16, |acc, (m, &w)| {
                match (t + m + 1).checked_sub(TAPS) {
                    Some(idx) => acc.wrapping_add(w.wrapping_mul(inputs[idx])),
                    None => acc,
                }
            })
        })
        .collect()
}

/// # Description
/// sum of the absolute differences, like the error check of the bare-metal test program
/// - None when the lengths differ, a missing output has no error to add up
pub fn total_error(outputs: &[i16], expected: &[i16]) -> Option<u64> {
    if outputs.len() != expected.len() {
        return None;
    }
    let total = outputs
        .iter()
        .zip(expected.iter())
        .map(|(&o, &e)| (i32::from(e) - i32::from(o)).unsigned_abs() as u64)
        .sum();
    Some(total)
}

#[cfg(test)]
mod test {
    use super::*;
    use std::error::Error;
    use std::fs::File;
    use std::io::Write;

    #[test]
    fn test_read_stimulus() -> Result<(), Box<dyn Error>> {
        std::fs::create_dir_all("test_data")?;
        let taps_name = "test_data/stimulus_taps.txt";
        let inputs_name = "test_data/stimulus_inputs.txt";
        let mut file = File::create(taps_name)?;
        file.write_all(b"# taps\n1 0 0 0 0 0 0 0\n0 0 0 0 0 0 0 -1 # last\n")?;
        let mut file = File::create(inputs_name)?;
        let data = (0..32).map(|i| i.to_string()).join(" ");
        file.write_all(data.as_bytes())?;

        let stimulus = Stimulus::new(taps_name, inputs_name)?;
        assert_eq!(stimulus.taps[0], 1);
        assert_eq!(stimulus.taps[15], -1);
        assert_eq!(stimulus.num_batches(), 2);
        assert_eq!(stimulus.batches().nth(1).unwrap()[0], 16);

        std::fs::remove_file(taps_name)?;
        std::fs::remove_file(inputs_name)?;
        Ok(())
    }

    #[test]
    fn test_missing_file_names_the_path() {
        let name = "test_data/no_such_taps.txt";
        match Stimulus::new(name, name) {
            Err(SimError::Stimulus { path, .. }) => assert_eq!(path, name),
            other => panic!("expected a stimulus error, got {:?}", other),
        }
    }

    #[test]
    fn test_bad_counts() {
        assert!(matches!(
            Stimulus::from_samples(&[1; 15], vec![0; 16]),
            Err(SimError::Stimulus { .. })
        ));
        assert!(Stimulus::from_samples(&[1; 16], vec![0; 17]).is_err());
        assert!(Stimulus::from_samples(&[1; 16], vec![]).is_err());
        assert!(Stimulus::from_samples(&[1; 16], vec![0; 48]).is_ok());
    }

    #[test]
    fn test_reference_delay() {
        // w[0] alone delays the stream by TAPS - 1 samples
        let mut taps = [0i16; TAPS];
        taps[0] = 1;
        let inputs: Vec<i16> = (1..=32).collect();
        let out = reference_fir(&taps, &inputs);
        assert!(out[..TAPS - 1].iter().all(|&v| v == 0));
        assert_eq!(out[TAPS - 1], 1);
        assert_eq!(out[31], 17);
    }

    #[test]
    fn test_reference_wraps() {
        let mut taps = [0i16; TAPS];
        taps[15] = 2;
        let out = reference_fir(&taps, &[i16::MAX; 16]);
        assert_eq!(out[0], -2);
        assert_eq!(total_error(&[1, -1], &[-1, 1]), Some(4));
    }

    #[test]
    fn test_total_error_needs_every_output() {
        let expected: Vec<i16> = (0..32).collect();
        assert_eq!(total_error(&expected, &expected), Some(0));
        assert_eq!(total_error(&expected[..16], &expected), None);
        assert_eq!(total_error(&[], &expected), None);
    }
}

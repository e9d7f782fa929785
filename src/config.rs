use {
    crate::{
        error::{Error, Result},
        false_sharing::ITERATIONS,
        matrix::{SquareMatrix, Tiling, BLOCK_SIZE, MATRIX_LEN},
    },
    once_cell::sync::Lazy,
    std::{fmt::Display, str::FromStr},
};

pub const ITERATIONS_VAR: &str = "CACHE_FX_ITERATIONS";
pub const MATRIX_LEN_VAR: &str = "CACHE_FX_MATRIX_LEN";
pub const BLOCK_SIZE_VAR: &str = "CACHE_FX_BLOCK_SIZE";
pub const PIN_VAR: &str = "CACHE_FX_PIN";
pub const REPETITIONS_VAR: &str = "CACHE_FX_REPETITIONS";

/// Experiment parameters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// Accumulation steps per worker per repetition.
    pub counter_iterations: i64,
    /// Side length of the combination matrices.
    pub matrix_len: usize,
    /// Tile side length of the blocked traversal. Must divide `matrix_len`.
    pub block_size: usize,
    /// Whether false-sharing workers are bound to two distinct CPUs.
    pub pin_workers: bool,
    /// Repetitions per experiment in the report binary.
    pub repetitions: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            counter_iterations: ITERATIONS,
            matrix_len: MATRIX_LEN,
            block_size: BLOCK_SIZE,
            pin_workers: true,
            repetitions: 10,
        }
    }
}

/// The configuration of this process, read from the environment on first use.
pub static CONFIG: Lazy<Config> = Lazy::new(|| match Config::from_env() {
    Ok(c) => c,
    Err(e) => panic!("Could not load configuration: {}", e),
});

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Builds a configuration from defaults overridden by whatever `lookup` returns.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(v) = lookup(ITERATIONS_VAR) {
            config.counter_iterations = parse_positive(ITERATIONS_VAR, &v)?;
        }
        if let Some(v) = lookup(MATRIX_LEN_VAR) {
            config.matrix_len = parse_positive(MATRIX_LEN_VAR, &v)?;
            if SquareMatrix::cell_count(config.matrix_len).is_none() {
                return Err(invalid(MATRIX_LEN_VAR, &v, "matrix would not fit in memory"));
            }
        }
        if let Some(v) = lookup(BLOCK_SIZE_VAR) {
            config.block_size = parse(BLOCK_SIZE_VAR, &v)?;
        }
        if let Some(v) = lookup(PIN_VAR) {
            config.pin_workers = parse_bool(PIN_VAR, &v)?;
        }
        if let Some(v) = lookup(REPETITIONS_VAR) {
            config.repetitions = parse_positive(REPETITIONS_VAR, &v)?;
        }
        config.tiling()?;
        Ok(config)
    }

    pub fn tiling(&self) -> Result<Tiling> {
        Tiling::new(self.matrix_len, self.block_size)
    }
}

fn invalid(var: &'static str, value: &str, reason: impl Display) -> Error {
    Error::InvalidSetting {
        var,
        value: value.to_owned(),
        reason: reason.to_string(),
    }
}

fn parse<T>(var: &'static str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    value.trim().parse().map_err(|e| invalid(var, value, e))
}

fn parse_positive<T>(var: &'static str, value: &str) -> Result<T>
where
    T: FromStr + Default + PartialOrd,
    T::Err: Display,
{
    let parsed: T = parse(var, value)?;
    if parsed <= T::default() {
        return Err(invalid(var, value, "must be positive"));
    }
    Ok(parsed)
}

fn parse_bool(var: &'static str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(invalid(var, value, "expected a boolean")),
    }
}

#[cfg(test)]
mod tests {
    use {super::*, std::collections::HashMap};

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| vars.get(var).cloned()
    }

    #[test]
    fn defaults_without_overrides() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.counter_iterations, 1_000_000);
        assert_eq!(config.matrix_len, 6400);
        assert_eq!(config.block_size, 8);
        assert_eq!(config.tiling().unwrap().tiles_per_side(), 800);
    }

    #[test]
    fn overrides_are_applied() {
        let config = Config::from_lookup(lookup(&[
            (ITERATIONS_VAR, "5000"),
            (MATRIX_LEN_VAR, " 512 "),
            (BLOCK_SIZE_VAR, "16"),
            (PIN_VAR, "off"),
            (REPETITIONS_VAR, "3"),
        ]))
        .unwrap();
        assert_eq!(
            config,
            Config {
                counter_iterations: 5000,
                matrix_len: 512,
                block_size: 16,
                pin_workers: false,
                repetitions: 3,
            }
        );
    }

    #[test]
    fn non_dividing_block_size_is_rejected() {
        let err = Config::from_lookup(lookup(&[(BLOCK_SIZE_VAR, "7")])).unwrap_err();
        assert!(matches!(
            err,
            Error::BlockSizeMismatch {
                side: 6400,
                block: 7
            }
        ));
    }

    #[test]
    fn garbage_is_rejected() {
        let err = Config::from_lookup(lookup(&[(ITERATIONS_VAR, "lots")])).unwrap_err();
        assert!(matches!(err, Error::InvalidSetting { var: ITERATIONS_VAR, .. }));
        let err = Config::from_lookup(lookup(&[(MATRIX_LEN_VAR, "0")])).unwrap_err();
        assert!(matches!(err, Error::InvalidSetting { var: MATRIX_LEN_VAR, .. }));
        let err = Config::from_lookup(lookup(&[(PIN_VAR, "maybe")])).unwrap_err();
        assert!(err.to_string().contains("expected a boolean"));
    }

    #[test]
    fn non_positive_counts_are_rejected() {
        let err = Config::from_lookup(lookup(&[(REPETITIONS_VAR, "0")])).unwrap_err();
        assert!(matches!(err, Error::InvalidSetting { var: REPETITIONS_VAR, .. }));
        let err = Config::from_lookup(lookup(&[(ITERATIONS_VAR, "-5")])).unwrap_err();
        assert!(matches!(err, Error::InvalidSetting { var: ITERATIONS_VAR, .. }));
        assert!(err.to_string().contains("must be positive"));
        let err = Config::from_lookup(lookup(&[(ITERATIONS_VAR, "0")])).unwrap_err();
        assert!(matches!(err, Error::InvalidSetting { var: ITERATIONS_VAR, .. }));
    }

    #[test]
    fn oversized_matrix_is_rejected() {
        let err = Config::from_lookup(lookup(&[
            (MATRIX_LEN_VAR, "4294967296"),
            (BLOCK_SIZE_VAR, "1"),
        ]))
        .unwrap_err();
        assert!(matches!(err, Error::InvalidSetting { var: MATRIX_LEN_VAR, .. }));
        assert!(err.to_string().contains("would not fit in memory"));
    }
}

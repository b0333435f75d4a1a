use std::env;

/// Environment variable enabling the block table echo.
pub const ECHO_ENV: &str = "BFALLOC_ECHO";

/// Runtime knobs for a heap.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Config {
  /// Print the block table to stdout after every successful allocate and
  /// release.
  pub echo_table: bool,
}

impl Config {
  pub const fn new() -> Self {
    Self { echo_table: false }
  }

  /// Reads the configuration from the environment.
  pub fn from_env() -> Self {
    Self {
      echo_table: env::var(ECHO_ENV).is_ok_and(|v| parse_flag(&v)),
    }
  }
}

fn parse_flag(
  value: &str,
) -> bool {
  matches!(
    value.trim().to_ascii_lowercase().as_str(),
    "1" | "true" | "yes" | "on"
  )
}

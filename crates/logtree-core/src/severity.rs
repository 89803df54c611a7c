//! Log entry severity levels.

use std::fmt;
use std::str::FromStr;

/// Severity of a log message, ordered from least to most severe.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Backtrace,
    Trace,
    Debug,
    Stat,
    #[default]
    Info,
    Change,
    Warning,
    Error,
    Fatal,
}

impl Severity {
    /// The wire / SQL name of this level.
    pub fn name(self) -> &'static str {
        match self {
            Severity::Backtrace => "backtrace",
            Severity::Trace => "trace",
            Severity::Debug => "debug",
            Severity::Stat => "stat",
            Severity::Info => "info",
            Severity::Change => "change",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Fatal => "fatal",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Case-sensitive parse of the wire names.
impl FromStr for Severity {
    type Err = UnknownSeverity;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "backtrace" => Ok(Severity::Backtrace),
            "trace" => Ok(Severity::Trace),
            "debug" => Ok(Severity::Debug),
            "stat" => Ok(Severity::Stat),
            "info" => Ok(Severity::Info),
            "change" => Ok(Severity::Change),
            "warning" => Ok(Severity::Warning),
            "error" => Ok(Severity::Error),
            "fatal" => Ok(Severity::Fatal),
            _ => Err(UnknownSeverity),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnknownSeverity;

impl fmt::Display for UnknownSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("unknown severity name")
    }
}

impl std::error::Error for UnknownSeverity {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_is_total() {
        assert!(Severity::Backtrace < Severity::Trace);
        assert!(Severity::Trace < Severity::Debug);
        assert!(Severity::Debug < Severity::Stat);
        assert!(Severity::Stat < Severity::Info);
        assert!(Severity::Info < Severity::Change);
        assert!(Severity::Change < Severity::Warning);
        assert!(Severity::Warning < Severity::Error);
        assert!(Severity::Error < Severity::Fatal);
    }

    #[test]
    fn parse_round_trip() {
        for s in [
            "backtrace",
            "trace",
            "debug",
            "stat",
            "info",
            "change",
            "warning",
            "error",
            "fatal",
        ] {
            assert_eq!(s.parse::<Severity>().unwrap().name(), s);
        }
    }

    #[test]
    fn parse_is_case_sensitive() {
        assert!("Info".parse::<Severity>().is_err());
        assert!("WARNING".parse::<Severity>().is_err());
        assert!("".parse::<Severity>().is_err());
    }
}

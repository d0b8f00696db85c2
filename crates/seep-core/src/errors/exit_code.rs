//! Process exit discipline.

use super::{ExtractError, IndexError, SchemaError};

/// Exit codes for embedding processes.
///
/// `SchemaStale` covers both gate regenerations (schema stamp and
/// extractor build): the caller must re-run the command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Ok = 0,
    SchemaStale = 2,
    Fatal = 1,
}

impl ExitCode {
    pub fn code(self) -> i32 {
        self as i32
    }
}

impl From<&IndexError> for ExitCode {
    fn from(e: &IndexError) -> Self {
        match e {
            IndexError::Schema(SchemaError::Stale { .. }) => Self::SchemaStale,
            IndexError::Extract(ExtractError::BuildOutOfDate) => Self::SchemaStale,
            _ => Self::Fatal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_gates_map_to_schema_stale() {
        let e = IndexError::Schema(SchemaError::Stale {
            current: "a".into(),
            stamped: "b".into(),
        });
        assert_eq!(ExitCode::from(&e), ExitCode::SchemaStale);

        let e = IndexError::Extract(ExtractError::BuildOutOfDate);
        assert_eq!(ExitCode::from(&e), ExitCode::SchemaStale);

        let e = IndexError::FidelityMismatch {
            file: "a.ts".into(),
            record_kind: "assignments".into(),
            expected: 3,
            actual: 2,
        };
        assert_eq!(ExitCode::from(&e), ExitCode::Fatal);
    }
}

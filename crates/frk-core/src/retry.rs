//! One-shot retry with an alternate strategy.

use std::fmt::{Debug, Display};

/// Run `op` with `primary`; on failure run it once more with `alternate`.
///
/// The first error is logged and dropped. The second, if any, is returned.
pub fn with_alternate<S, T, E, F>(primary: S, alternate: S, mut op: F) -> Result<T, E>
where
    S: Debug + Copy,
    E: Display,
    F: FnMut(S) -> Result<T, E>,
{
    match op(primary) {
        Ok(value) => Ok(value),
        Err(first) => {
            tracing::warn!(
                strategy = ?primary,
                fallback = ?alternate,
                error = %first,
                "attempt failed, retrying with alternate strategy"
            );
            op(alternate)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primary_success_skips_alternate() {
        let mut calls = Vec::new();
        let out: Result<u32, String> = with_alternate("direct", "proxy", |s| {
            calls.push(s);
            Ok(7)
        });
        assert_eq!(out.unwrap(), 7);
        assert_eq!(calls, vec!["direct"]);
    }

    #[test]
    fn falls_back_once() {
        let mut calls = Vec::new();
        let out: Result<u32, String> = with_alternate("direct", "proxy", |s| {
            calls.push(s);
            if s == "direct" {
                Err("refused".to_string())
            } else {
                Ok(1)
            }
        });
        assert_eq!(out.unwrap(), 1);
        assert_eq!(calls, vec!["direct", "proxy"]);
    }

    #[test]
    fn returns_second_error_when_both_fail() {
        let out: Result<(), String> =
            with_alternate(1, 2, |s| Err(format!("attempt {s} failed")));
        assert_eq!(out.unwrap_err(), "attempt 2 failed");
    }
}

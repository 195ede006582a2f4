use crate::error::{QueryError, Result};

use super::CompiledRegex;

/// Supported flags: `i m s x u`.
/// `u` has no effect under the `regex` crate (Unicode mode is already the
/// default) and is accepted as a no-op for compatibility with driver tests
/// that always pass it.
const SUPPORTED_FLAGS: &str = "imsxu";

pub fn compile_regex(pattern: &str, options: &str) -> Result<CompiledRegex> {
    for flag in options.chars() {
        if !SUPPORTED_FLAGS.contains(flag) {
            return Err(QueryError::BadValue(format!(
                "unsupported regex flag: {flag}"
            )));
        }
    }
    let inline: String = options.chars().filter(|c| *c != 'u').collect();
    let full_pattern = if inline.is_empty() {
        pattern.to_string()
    } else {
        format!("(?{inline}){pattern}")
    };
    let regex = regex::Regex::new(&full_pattern)
        .map_err(|e| QueryError::BadValue(format!("invalid regex: {e}")))?;
    Ok(CompiledRegex {
        pattern: pattern.to_string(),
        options: options.to_string(),
        regex,
    })
}

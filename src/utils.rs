use std::any::type_name;

/// Cluster id of a vertex that has not been assigned yet.
pub const UNASSIGNED: u64 = u64::MAX / 2 - 1;

/// Cluster id of a vertex with no incident edges.
pub const ISOLATED: u64 = u64::MAX;

#[allow(dead_code)]
pub fn type_of<T>() -> &'static str {
    type_name::<T>()
}

/// Reads the `LOUVX_VERBOSE` environment variable ("1" enables progress output).
#[inline]
pub(crate) fn verbose() -> bool {
    std::env::var("LOUVX_VERBOSE").unwrap_or_else(|_| "0".to_string()) == "1"
}

/// Checks that a `val` is a finite `f64`. Outputs a result with a custom error message.
///
/// # Arguments
///
/// * `val`: `f64` --- the value to be checked.
/// * `op_description`: `&str` --- the custom error message.
#[inline(always)]
pub(crate) fn f64_is_finite(
    val: f64,
    op_description: &str,
) -> Result<f64, Box<dyn std::error::Error>> {
    if !val.is_finite() {
        return Err(format!("error abnormal value at {op_description} = {val}").into());
    }
    Ok(val)
}

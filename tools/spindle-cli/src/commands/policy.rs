//! Print the default retry policy.

use spindle::RetryPolicy;

use crate::error::Result;
use crate::output;
use crate::OutputFormat;

/// Print the policy a connection uses when none is configured.
pub fn run(format: OutputFormat) -> Result<()> {
    println!("{}", output::format_policy(&RetryPolicy::default(), format)?);
    Ok(())
}

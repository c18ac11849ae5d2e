//! Tag histogram report.

use super::{CommandError, load_catalog};

/// Print every tag with its product count, most used first.
///
/// # Errors
///
/// Returns an error if the catalog cannot be loaded.
pub async fn run() -> Result<(), CommandError> {
    let (state, pool) = load_catalog().await?;
    let histogram = state.tags().histogram().await?;
    pool.close().await;

    #[allow(clippy::print_stdout)]
    for entry in &histogram {
        println!("{:>6}  {}", entry.count, entry.tag);
    }
    Ok(())
}

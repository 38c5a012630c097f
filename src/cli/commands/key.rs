//! Key command - print the cache key derived from input files

use crate::cache::CacheKey;
use crate::cli::args::KeyArgs;
use crate::error::PipecacheResult;

/// Execute the key command
pub async fn execute(args: KeyArgs) -> PipecacheResult<()> {
    let key = CacheKey::digest_files(&args.inputs)?;
    println!("{}", key);
    Ok(())
}

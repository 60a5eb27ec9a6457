use std::env;
use std::fs::File;
use std::io::Write;
use std::path::{PathBuf, Path};

use anyhow::{Context, Result};

/// Generate build metadata file that is then included in code
fn build_metadata() -> Result<()> {
    built::write_built_file()?;
    Ok(())
}

// Copies the `memory.x` file from the crate root into a directory where
// the linker can always find it at build time.
fn memory(out: &Path) -> Result<()> {
    File::create(out.join("memory.x"))
        .and_then(|mut f| f.write_all(include_bytes!("memory.x")))
        .context("Saving memory.x")?;

    // Ensure it's on the linker search path.
    println!("cargo:rustc-link-search={}", out.display());

    // Only re-run when `memory.x` is changed.
    println!("cargo:rerun-if-changed=memory.x");

    Ok(())
}

fn main() -> Result<()>  {
    build_metadata()?;
    let out = &PathBuf::from(env::var_os("OUT_DIR").context("Could not get OUT_DIR")?);
    memory(out)?;
    Ok(())
}

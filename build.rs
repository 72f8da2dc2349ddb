//! Renders the `hoist.1` man page into `OUT_DIR` from the clap definitions
//! shared with the binary.

use std::env;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use clap::CommandFactory;
use clap_mangen::Man;

#[path = "src/cli/mod.rs"]
mod cli;

const MAN_PAGE: &str = "hoist.1";

fn render_man_page(out_dir: &Path) -> io::Result<PathBuf> {
    let mut page = Vec::new();
    Man::new(cli::Cli::command()).render(&mut page)?;

    let target = out_dir.join(MAN_PAGE);
    fs::write(&target, page)?;
    Ok(target)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut stdout = io::stdout();
    for watched in ["build.rs", "src/cli/mod.rs"] {
        writeln!(stdout, "cargo:rerun-if-changed={watched}")?;
    }

    let out_dir = env::var_os("OUT_DIR")
        .map(PathBuf::from)
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "OUT_DIR was not set"))?;
    render_man_page(&out_dir)?;

    Ok(())
}

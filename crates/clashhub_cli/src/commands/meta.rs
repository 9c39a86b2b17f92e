//! Shell completions and man pages.

use std::error::Error;
use std::io::Write;
use std::path::{Path, PathBuf};

use clap::CommandFactory;

use crate::Cli;

const BIN_NAME: &str = "clashhub";

fn render_completions(shell: clap_complete::Shell) -> Vec<u8> {
    let mut cmd = Cli::command();
    let mut script = Vec::new();
    clap_complete::generate(shell, &mut cmd, BIN_NAME, &mut script);
    script
}

fn render_man_page() -> std::io::Result<Vec<u8>> {
    let mut page = Vec::new();
    clap_mangen::Man::new(Cli::command()).render(&mut page)?;
    Ok(page)
}

/// Write man pages for the binary and every subcommand into `dir`.
fn write_man_pages(dir: &Path) -> std::io::Result<usize> {
    std::fs::create_dir_all(dir)?;
    clap_mangen::generate_to(Cli::command(), dir)?;
    Ok(std::fs::read_dir(dir)?.count())
}

pub(crate) fn handle_completions(shell: clap_complete::Shell) -> Result<(), Box<dyn Error>> {
    std::io::stdout().write_all(&render_completions(shell))?;
    Ok(())
}

pub(crate) fn handle_man(output: Option<PathBuf>) -> Result<(), Box<dyn Error>> {
    match output {
        Some(dir) => {
            let count = write_man_pages(&dir)?;
            println!("Wrote {count} man page(s) to {}", dir.display());
        }
        None => std::io::stdout().write_all(&render_man_page()?)?,
    }
    Ok(())
}

mod archive;
mod config;
mod git;
mod paths;
mod pipeline;
mod registry;
mod sync;
mod types;

#[cfg(test)]
mod testutil;

use clap::Parser;

use crate::config::Args;
use crate::sync::{SyncOutcome, TagOutcome};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    match pipeline::execute(args) {
        Ok(report) => match report.outcome {
            SyncOutcome::UpToDate => {
                println!("{} is already mirrored, nothing to do", report.release);
            }
            SyncOutcome::Published { commit, tag } => {
                println!("Mirrored {} as commit {}", report.release, commit);
                match &tag {
                    TagOutcome::Created(_) => println!("Tagged {}", tag.tag()),
                    TagOutcome::Conflict { reason, .. } => {
                        println!("Tag {} was not created: {}", tag.tag(), reason)
                    }
                }
            }
        },
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

// WikiVoice - Wiki Voice Line Downloader for Desktop
// Copyright (C) 2025 WikiVoice Contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! Desktop testing harness for the WikiVoice core
//!
//! Exercises the session end-to-end against a real wiki endpoint without
//! the GUI. Not part of the library contract.

use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};

use wikivoice_core::download::progress::{BatchProgress, EventSink};
use wikivoice_core::{SessionConfig, WikiSession};

#[derive(Parser)]
#[command(name = "wikivoice-cli")]
#[command(about = "WikiVoice CLI - drive the crawl/download core from a terminal", long_about = None)]
struct Cli {
    /// Wiki API endpoint, e.g. https://wiki.example.org/api.php
    #[arg(short, long, global = true, default_value = "")]
    endpoint: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search categories for a keyword and print the entity groups
    Search {
        keyword: String,
        /// Group all categories instead of voice categories only
        #[arg(long)]
        general: bool,
    },
    /// Print the subcategory tree under a category
    Tree {
        category: String,
    },
    /// List downloadable files of a category
    Files {
        category: String,
        /// Include non-audio files
        #[arg(long)]
        all: bool,
    },
    /// Search files by keyword across the wiki
    SearchFiles {
        keyword: String,
    },
    /// Download every audio file of a category into a directory
    Download {
        category: String,
        /// Target directory
        #[arg(short, long, default_value = "downloads")]
        out: String,
        /// Worker pool width
        #[arg(short, long)]
        concurrency: Option<usize>,
    },
}

/// Sink printing every event to stdout
struct PrintSink;

impl EventSink for PrintSink {
    fn log(&self, message: &str) {
        println!("{}", message);
    }

    fn progress(&self, progress: &BatchProgress) {
        println!("{}", progress.display_string());
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    if cli.endpoint.is_empty() {
        anyhow::bail!("--endpoint is required, e.g. --endpoint https://wiki.example.org/api.php");
    }

    let session = WikiSession::new(SessionConfig::new(&cli.endpoint), Arc::new(PrintSink))
        .context("building session")?;

    match cli.command {
        Commands::Search { keyword, general } => {
            let groups = session.search_and_group(&keyword, !general).await?;
            for group in &groups {
                println!(
                    "{} (root: {}, {} categories)",
                    group.entity_name,
                    group.root_category,
                    group.member_categories.len()
                );
            }
        }
        Commands::Tree { category } => {
            let tree = session.scan_category_tree(&category).await?;
            for title in tree.iter() {
                println!("{}", title);
            }
        }
        Commands::Files { category, all } => {
            let files = session.resolve_category_files(&category, !all).await?;
            for file in &files {
                println!("{}\t{}", file.name, file.url);
            }
        }
        Commands::SearchFiles { keyword } => {
            let files = session.search_files(&keyword, true).await?;
            for file in &files {
                println!("{}\t{}", file.name, file.url);
            }
        }
        Commands::Download {
            category,
            out,
            concurrency,
        } => {
            let files = session.resolve_category_files(&category, true).await?;
            let report = session.download_all(&files, out, concurrency).await?;
            println!("{}", report.summary());
        }
    }

    Ok(())
}

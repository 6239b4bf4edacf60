//! Command line front end for the question gateway.
//!
//! Every subcommand builds a gateway from config, runs one operation and
//! prints the result as JSON on stdout.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use std::path::{Path, PathBuf};
use std::time::Duration;
use trivia_core::{
    init_logging, BulkUpload, BulkUploadFileInfo, GatewayConfig, Question, QuestionFeed,
    QuestionGateway, QuestionStatus, SearchCriteria, UploadFile,
};

#[derive(Debug, Parser)]
#[command(name = "trivia")]
#[command(about = "Manage trivia questions through the question gateway")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// TOML configuration file. Defaults plus TRIVIA_* variables when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Check core linkage
    Ping,
    /// Fetch the question of the day
    Day {
        /// Fetch tomorrow's question instead of today's
        #[arg(long)]
        next: bool,
    },
    /// Run a paged search against the index
    Search {
        /// Free-text search input
        #[arg(short, long)]
        query: Option<String>,
        #[arg(long = "tag")]
        tags: Vec<String>,
        #[arg(long = "category")]
        category_ids: Vec<String>,
        #[arg(long, default_value_t = 0)]
        offset: u32,
        #[arg(long, default_value_t = 10)]
        page_size: u32,
    },
    /// Create or overwrite an unpublished question from a JSON file
    Save {
        #[arg(short, long)]
        file: PathBuf,
    },
    /// Import a batch of questions together with its source file
    Import {
        #[arg(long)]
        owner: String,
        /// JSON array of questions
        #[arg(long)]
        questions: PathBuf,
        /// Original upload file stored next to the batch
        #[arg(long)]
        file: PathBuf,
        #[arg(long = "tag")]
        tags: Vec<String>,
        #[arg(long = "category")]
        categories: Vec<String>,
    },
    /// List the questions owned by a user
    List {
        #[arg(long)]
        user: String,
        #[arg(long)]
        published: bool,
        /// Keep printing updates until interrupted
        #[arg(long)]
        follow: bool,
    },
    /// List unpublished questions awaiting review
    Pending {
        /// Bulk-imported questions instead of single saves
        #[arg(long)]
        bulk: bool,
        /// Status codes to include (0 draft, 1 under review, 2 approved, 3 rejected)
        #[arg(long = "status")]
        statuses: Vec<u8>,
        #[arg(long)]
        follow: bool,
    },
    /// Publish an unpublished question
    Approve {
        #[arg(long)]
        id: String,
    },
    /// Reject an unpublished question with a reviewer note
    Reject {
        #[arg(long)]
        id: String,
        #[arg(long)]
        reason: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Ping = cli.command {
        println!("trivia_core ping={}", trivia_core::ping());
        println!("trivia_core version={}", trivia_core::core_version());
        return Ok(());
    }

    let config = load_config(cli.config.as_deref())?;
    if let Some(dir) = &config.logging.dir {
        init_logging(&config.logging.level, &dir.to_string_lossy())
            .map_err(anyhow::Error::msg)
            .context("failed to initialize logging")?;
    }
    let gateway =
        QuestionGateway::from_config(&config).context("failed to build question gateway")?;
    info!("event=cli_command module=cli status=start");

    run(&gateway, cli.command)
}

fn load_config(path: Option<&Path>) -> Result<GatewayConfig> {
    let config = match path {
        Some(path) => GatewayConfig::load(path)
            .with_context(|| format!("failed to load config `{}`", path.display()))?,
        None => GatewayConfig::from_env().context("invalid TRIVIA_* environment")?,
    };
    Ok(config)
}

fn run(gateway: &QuestionGateway, command: Commands) -> Result<()> {
    match command {
        Commands::Ping => {}
        Commands::Day { next } => {
            let question = gateway.question_of_the_day(next)?;
            print_json(&question)?;
        }
        Commands::Search {
            query,
            tags,
            category_ids,
            offset,
            page_size,
        } => {
            let criteria = SearchCriteria {
                search_input: query,
                category_ids,
                tags,
                status: None,
            };
            let results = gateway.get_questions(offset, page_size, &criteria)?;
            print_json(&results)?;
        }
        Commands::Save { file } => {
            let question: Question = read_json(&file)?;
            let outcome = gateway.save_question(&question)?;
            print_json(&serde_json::json!({
                "id": outcome.id,
                "created": outcome.created,
            }))?;
        }
        Commands::Import {
            owner,
            questions,
            file,
            tags,
            categories,
        } => {
            let questions: Vec<Question> = read_json(&questions)?;
            let file_name = file
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .with_context(|| format!("`{}` has no file name", file.display()))?;
            let bytes = std::fs::read(&file)
                .with_context(|| format!("failed to read `{}`", file.display()))?;

            let mut file_info = BulkUploadFileInfo::new(owner, file_name.clone());
            file_info.tags = tags;
            file_info.categories = categories;
            let receipt = gateway.save_bulk_questions(&BulkUpload {
                file_info,
                questions,
                file: UploadFile::new(file_name, bytes),
            })?;
            print_json(&serde_json::json!({
                "bulkUploadId": receipt.bulk_upload_id,
                "filePath": receipt.file_path,
                "questionIds": receipt.question_ids,
            }))?;
        }
        Commands::List {
            user,
            published,
            follow,
        } => {
            let feed = gateway.user_questions(&user, published)?;
            print_feed(feed, follow)?;
        }
        Commands::Pending {
            bulk,
            statuses,
            follow,
        } => {
            let statuses = statuses
                .into_iter()
                .map(QuestionStatus::try_from)
                .collect::<Result<Vec<_>, _>>()?;
            let feed = gateway.unpublished_questions(bulk, &statuses)?;
            print_feed(feed, follow)?;
        }
        Commands::Approve { id } => {
            let question = gateway.unpublished_question(&id)?;
            let approved = gateway.approve_question(&question)?;
            print_json(&approved)?;
        }
        Commands::Reject { id, reason } => {
            let question = gateway.unpublished_question(&id)?;
            let rejected = gateway.reject_question(&question, &reason)?;
            print_json(&rejected)?;
        }
    }
    Ok(())
}

fn print_feed(mut feed: QuestionFeed, follow: bool) -> Result<()> {
    // A local store fills every watch on registration.
    let first = feed
        .next_timeout(Duration::from_secs(5))
        .context("timed out waiting for the first snapshot")??;
    print_json(&first)?;
    if !follow {
        return Ok(());
    }
    loop {
        let update = feed.next()?;
        print_json(&update)?;
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read `{}`", path.display()))?;
    let value = serde_json::from_str(&text)
        .with_context(|| format!("`{}` is not valid JSON for this command", path.display()))?;
    Ok(value)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value)?;
    println!("{text}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{Cli, Commands};
    use clap::Parser;

    #[test]
    fn parses_pending_with_repeated_status() {
        let cli = Cli::try_parse_from([
            "trivia", "pending", "--bulk", "--status", "1", "--status", "2",
        ])
        .unwrap();

        match cli.command {
            Commands::Pending {
                bulk,
                statuses,
                follow,
            } => {
                assert!(bulk);
                assert!(!follow);
                assert_eq!(statuses, [1, 2]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn config_flag_is_global() {
        let cli =
            Cli::try_parse_from(["trivia", "day", "--next", "--config", "trivia.toml"]).unwrap();
        assert_eq!(cli.config.as_deref(), Some(std::path::Path::new("trivia.toml")));
        assert!(matches!(cli.command, Commands::Day { next: true }));
    }

    #[test]
    fn reject_requires_reason() {
        assert!(Cli::try_parse_from(["trivia", "reject", "--id", "q1"]).is_err());
    }
}

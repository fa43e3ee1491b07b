//! Plume command line client.
//!
//! Prints the feed list or follows the notification stream of the account
//! whose token is in `PLUME_TOKEN`.

use std::path::PathBuf;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use plume_cache::{FeedItem, FeedQuery, UserId};
use plume_client::{Client, NotificationView};
use plume_net::{ClientConfig, Credential};
use plume_stream::ConnectionState;
use plume_sync::LoadOutcome;
use tracing::{info, warn};

/// Command line arguments.
#[derive(Parser, Debug)]
#[command(name = "plume")]
#[command(about = "Plume feed and notification client")]
struct Args {
	/// Configuration file (defaults to $XDG_CONFIG_HOME/plume/config.toml)
	#[arg(short, long, value_name = "PATH")]
	config: Option<PathBuf>,

	/// Id of the signed-in user
	#[arg(long, value_name = "ID", default_value_t = 0)]
	viewer: u64,

	/// Verbose logging
	#[arg(short, long)]
	verbose: bool,

	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Print the feed list
	Feed {
		/// Number of pages to load
		#[arg(long, default_value_t = 1)]
		pages: u32,

		/// Search results for a keyword instead of the latest posts
		#[arg(long, conflicts_with = "author")]
		search: Option<String>,

		/// Posts of one author
		#[arg(long, value_name = "ID")]
		author: Option<u64>,
	},
	/// Print notifications and connection changes until interrupted
	Watch,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
	let args = Args::parse();

	setup_tracing(args.verbose);

	let config = ClientConfig::load(args.config.as_deref()).context("loading configuration")?;
	let credential = Credential::from_env();
	if credential.is_none() {
		warn!("PLUME_TOKEN is not set");
	}
	let client = Client::connect(&config, credential, UserId(args.viewer)).context("building client")?;
	info!(base_url = %config.base_url, "starting plume");

	match args.command {
		Command::Feed { pages, search, author } => feed(&client, feed_query(search, author), pages).await,
		Command::Watch => watch(&client).await,
	}
}

fn feed_query(search: Option<String>, author: Option<u64>) -> FeedQuery {
	match (search, author) {
		(Some(keyword), _) => FeedQuery::Search(keyword),
		(None, Some(author)) => FeedQuery::ByAuthor(UserId(author)),
		(None, None) => FeedQuery::Latest,
	}
}

async fn feed(client: &Client, query: FeedQuery, pages: u32) -> anyhow::Result<()> {
	let list = client.feed_list(query);
	for _ in 0..pages {
		let outcome = list.load_more().await.map_err(|err| anyhow::anyhow!(err.user_message()))?;
		if matches!(outcome, Some(LoadOutcome::Loaded { has_next: false, .. } | LoadOutcome::Skipped(_))) {
			break;
		}
	}
	let view = list.view();
	for item in &view.items {
		println!("{}", render_item(item));
	}
	if view.has_more {
		println!("(more available)");
	}
	Ok(())
}

fn render_item(item: &FeedItem) -> String {
	let liked = if item.liked { "*" } else { "" };
	let first_line = item.content.lines().next().unwrap_or_default();
	format!(
		"#{id} by {author} [{likes}{liked} likes, {comments} comments] {first_line}",
		id = item.id,
		author = item.author_id,
		likes = item.like_count,
		comments = item.comment_count,
	)
}

async fn watch(client: &Client) -> anyhow::Result<()> {
	if client.credential().is_none() {
		bail!("watching notifications needs PLUME_TOKEN");
	}
	let mut stream = client.notification_stream();
	let mut last = stream.view();
	println!("[{}]", last.state.as_str());
	loop {
		let next = tokio::select! {
			_ = tokio::signal::ctrl_c() => break,
			next = stream.changed() => next,
		};
		let Some(next) = next else {
			break;
		};
		for line in describe(&last, &next) {
			println!("{line}");
		}
		if next.state == ConnectionState::Disconnected {
			bail!("notification stream closed; the token was rejected");
		}
		last = next;
	}
	Ok(())
}

/// Lines to print for the step from `last` to `next`.
fn describe(last: &NotificationView, next: &NotificationView) -> Vec<String> {
	let mut lines = Vec::new();
	if next.state != last.state {
		lines.push(format!("[{}]", next.state.as_str()));
	}
	if next.latest != last.latest
		&& let Some(message) = &next.latest
	{
		match message.feed_id {
			Some(feed) => lines.push(format!("{} (#{feed})", message.text)),
			None => lines.push(message.text.clone()),
		}
	}
	lines
}

fn setup_tracing(verbose: bool) {
	use std::fs::OpenOptions;

	use tracing_subscriber::EnvFilter;
	use tracing_subscriber::fmt::format::FmtSpan;
	use tracing_subscriber::prelude::*;

	let filter = || {
		EnvFilter::try_from_env("PLUME_LOG")
			.or_else(|_| EnvFilter::try_from_default_env())
			.unwrap_or_else(|_| {
				if verbose {
					EnvFilter::new("plume=trace,debug")
				} else {
					EnvFilter::new("warn")
				}
			})
	};

	if let Some(log_dir) = std::env::var("PLUME_LOG_DIR").ok().map(PathBuf::from)
		&& std::fs::create_dir_all(&log_dir).is_ok()
	{
		let log_path = log_dir.join(format!("plume.{}.log", std::process::id()));

		if let Ok(file) = OpenOptions::new().create(true).append(true).open(&log_path) {
			let file_layer = tracing_subscriber::fmt::layer()
				.with_writer(file)
				.with_ansi(false)
				.with_span_events(FmtSpan::CLOSE)
				.with_target(true);

			tracing_subscriber::registry().with(filter()).with(file_layer).init();

			tracing::info!(path = ?log_path, "tracing initialized");
			return;
		}
	}

	// stdout carries command output
	tracing_subscriber::fmt()
		.with_env_filter(filter())
		.with_writer(std::io::stderr)
		.init();
}

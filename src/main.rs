use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use clinic_site::cache::PostsCache;
use clinic_site::clock::{Clock, SystemClock};
use clinic_site::config::{self, Config};
use clinic_site::db::{self, SqliteStore};
use clinic_site::email::ResendClient;
use clinic_site::model::{ContactForm, Provenance};
use clinic_site::pipeline::ContactPipeline;
use clinic_site::slug;
use clinic_site::posts::{self, PostQueryOptions, PostsQuery, DEFAULT_PAGE_SIZE};
use clinic_site::submissions::SubmissionLog;
use clinic_site::webhook::WebhookClient;

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create or upgrade the database schema
    Provision,
    /// Run one contact-form submission through the pipeline
    Submit {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        service: Option<String>,
        #[arg(long)]
        message: String,
        /// Recorded as the submitter's user agent
        #[arg(long, default_value = "clinic-site-cli")]
        user_agent: String,
    },
    /// Latest submissions, newest first
    Recent {
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
    /// Dashboard counters
    Stats,
    /// Per-day totals
    Analytics {
        #[arg(long, default_value_t = 7)]
        days: i64,
    },
    /// List posts
    Posts {
        #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
        limit: i64,
        #[arg(long, default_value_t = 0)]
        offset: i64,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        search: Option<String>,
        #[arg(long)]
        published: Option<bool>,
    },
    /// Show one post by slug or id, with related posts
    Post { slug_or_id: String },
    /// Send a sample envelope to the configured webhook
    WebhookTest,
    /// Print the URL slug a post title maps to
    Slug { title: String },
}

#[derive(Serialize)]
struct PostsOutput<'a> {
    posts: &'a [clinic_site::model::Post],
    total_count: i64,
    has_more: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    if let Command::Slug { title } = &args.command {
        let slug = slug::clean_slug(title);
        return print_json(&serde_json::json!({ "slug": slug, "valid": !slug.is_empty() }));
    }
    let cfg = config::load(Some(&args.config))
        .with_context(|| format!("failed to load {}", args.config.display()))?;

    let pool = db::init_pool(&cfg.database_url()).await?;
    let store = Arc::new(SqliteStore::new(pool));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let log = Arc::new(
        SubmissionLog::new(store.clone(), clock.clone()).with_auto_provision(cfg.app.auto_provision),
    );

    match args.command {
        Command::Provision => {
            log.provision().await?;
            info!("schema provisioned");
        }
        Command::Submit {
            name,
            email,
            phone,
            service,
            message,
            user_agent,
        } => {
            let pipeline = build_pipeline(&cfg, log, clock)?;
            let form = ContactForm {
                name,
                email,
                phone,
                service,
                message,
            };
            let provenance = Provenance {
                ip_address: None,
                user_agent: Some(user_agent),
            };
            print_json(&pipeline.submit_from(&form, &provenance).await)?;
        }
        Command::Recent { limit } => print_json(&log.recent_submissions(limit).await)?,
        Command::Stats => print_json(&log.submission_stats().await)?,
        Command::Analytics { days } => print_json(&log.analytics(days).await)?,
        Command::Posts {
            limit,
            offset,
            category,
            search,
            published,
        } => {
            let cache = Arc::new(PostsCache::new(cfg.posts.cache_ttl(), clock));
            let options = PostQueryOptions {
                limit,
                offset,
                category,
                search_query: search,
                published,
                ..Default::default()
            };
            let mut query =
                PostsQuery::new(store, cache, options).with_columns(cfg.posts.columns);
            query.fetch().await;
            print_json(&PostsOutput {
                posts: query.posts(),
                total_count: query.total_count(),
                has_more: query.has_more(),
                error: query.error(),
            })?;
        }
        Command::Post { slug_or_id } => {
            let cache = PostsCache::new(cfg.posts.cache_ttl(), clock);
            let state = posts::load_post(store.as_ref(), &cache, cfg.posts.columns, &slug_or_id).await;
            let related = match &state.post {
                Some(post) => {
                    posts::related_posts(store.as_ref(), cfg.posts.columns, &post.category, &post.id, 3)
                        .await
                }
                None => Vec::new(),
            };
            print_json(&serde_json::json!({ "post": state.post, "error": state.error, "related": related }))?;
        }
        Command::WebhookTest => {
            let webhook = cfg
                .webhook
                .as_ref()
                .context("no webhook configured")?;
            let client = WebhookClient::from_config(webhook)?;
            match client.send_test(clock.now()).await {
                Ok(id) => print_json(&serde_json::json!({ "success": true, "id": id }))?,
                Err(err) => {
                    warn!(error = %err, "webhook test failed");
                    print_json(&serde_json::json!({ "success": false, "error": format!("{err:#}") }))?
                }
            }
        }
        // Needs no config; answered above.
        Command::Slug { .. } => {}
    }
    Ok(())
}

fn build_pipeline(cfg: &Config, log: Arc<SubmissionLog>, clock: Arc<dyn Clock>) -> Result<ContactPipeline> {
    let mut pipeline = ContactPipeline::new(log, clock, cfg.app.contact_address.clone());
    if let Some(email) = &cfg.email {
        pipeline = pipeline.with_direct(Arc::new(ResendClient::from_config(email)?));
    } else {
        info!("email channel not configured");
    }
    if let Some(webhook) = &cfg.webhook {
        pipeline = pipeline.with_fallback(Arc::new(WebhookClient::from_config(webhook)?));
    } else {
        info!("webhook channel not configured");
    }
    Ok(pipeline)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

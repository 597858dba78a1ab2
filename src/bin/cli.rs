//! Datalens CLI
//!
//! Command-line client for a running Datalens server:
//! - Page through assets of a revision
//! - Show statistics, model info and dedup counts
//! - Record and query usage metrics
//! - Generate a config template

use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "datalens")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Query versioned, annotated media datasets")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// API server URL
    #[arg(long, default_value = "http://localhost:8090", global = true)]
    pub api_url: String,

    /// Output format (table, json)
    #[arg(short, long, default_value = "table", global = true)]
    pub format: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List assets of a revision
    Assets {
        /// Revision as user/repo/branch@task
        revision: String,
        /// Class ids to match
        #[arg(short, long, value_delimiter = ',')]
        class_ids: Vec<i32>,
        /// Annotation layers the class match is restricted to (gt, pred)
        #[arg(long, value_delimiter = ',')]
        layers: Vec<String>,
        /// Asset-level tag filters: key or key:value
        #[arg(long)]
        cks: Vec<String>,
        /// Annotation tag filters: key or key:value
        #[arg(long)]
        tags: Vec<String>,
        /// Confusion-matrix codes to include (TP, FP, FN, MTP, ...)
        #[arg(long, value_delimiter = ',')]
        include_cm: Vec<String>,
        /// Confusion-matrix codes to exclude
        #[arg(long, value_delimiter = ',')]
        exclude_cm: Vec<String>,
        /// Start the page at this asset id
        #[arg(long)]
        anchor: Option<String>,
        #[arg(long, default_value = "0")]
        offset: usize,
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Show revision statistics
    Stats {
        /// Revision as user/repo/branch@task
        revision: String,
        #[arg(short, long, value_delimiter = ',')]
        class_ids: Vec<i32>,
        /// Include asset and annotation histograms
        #[arg(long)]
        histograms: bool,
    },

    /// Show the revision summary, optionally waiting for its index
    Meta {
        /// Revision as user/repo/branch@task
        revision: String,
        /// Poll until the index is ready
        #[arg(long)]
        wait: bool,
    },

    /// Show the model produced by a revision's task
    Model {
        /// Revision as user/repo/branch@task
        revision: String,
    },

    /// Count duplicated asset ids across revisions
    Dup {
        /// Candidate revisions (user/repo/branch@task)
        #[arg(long, required = true)]
        candidate: Vec<String>,
        /// Revisions whose residual count is reported
        #[arg(long)]
        corrodee: Vec<String>,
    },

    /// Record a usage event (JSON object with id and user_id)
    Record {
        group: String,
        event: String,
    },

    /// Query a metrics group
    Metrics {
        group: String,
        #[arg(short, long)]
        user: String,
        /// Event field to aggregate
        #[arg(long)]
        field: String,
        /// count or time
        #[arg(long, default_value = "count")]
        mode: String,
        /// day, week or month (time mode)
        #[arg(long)]
        unit: Option<String>,
        #[arg(short, long)]
        limit: Option<usize>,
        #[arg(short, long, value_delimiter = ',')]
        class_ids: Vec<i32>,
    },

    /// Show server status
    Status,

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let api = |path: &str| format!("{}/api/v1/{}", cli.api_url, path);

    match cli.command {
        Commands::Assets {
            revision,
            class_ids,
            layers,
            cks,
            tags,
            include_cm,
            exclude_cm,
            anchor,
            offset,
            limit,
        } => {
            let mut body = parse_revision(&revision)?;
            body["class_ids"] = json!(class_ids);
            body["annotation_layers"] = json!(layers);
            body["cks"] = json!(cks);
            body["tags"] = json!(tags);
            body["include_cm"] = json!(upper(include_cm));
            body["exclude_cm"] = json!(upper(exclude_cm));
            body["anchor_asset_id"] = json!(anchor);
            body["offset"] = json!(offset);
            body["limit"] = json!(limit);

            let data = post(&client, &api("assets"), &body).await?;
            if cli.format == "json" {
                println!("{}", serde_json::to_string_pretty(&data)?);
            } else {
                print_assets(&data);
            }
        }

        Commands::Stats {
            revision,
            class_ids,
            histograms,
        } => {
            let mut body = parse_revision(&revision)?;
            body["class_ids"] = json!(class_ids);
            body["asset_histograms"] = json!(histograms);
            body["annotation_histograms"] = json!(histograms);

            let data = post(&client, &api("stats"), &body).await?;
            if cli.format == "json" {
                println!("{}", serde_json::to_string_pretty(&data)?);
            } else {
                print_stats(&data);
            }
        }

        Commands::Meta { revision, wait } => {
            let body = parse_revision(&revision)?;
            let mut data = post(&client, &api("meta"), &body).await?;

            // The server builds in the background; poll with backoff
            let mut delay = Duration::from_millis(200);
            while wait && !data["index_ready"].as_bool().unwrap_or(false) {
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(Duration::from_secs(5));
                data = post(&client, &api("meta"), &body).await?;
            }
            println!("{}", serde_json::to_string_pretty(&data)?);
        }

        Commands::Model { revision } => {
            let body = parse_revision(&revision)?;
            let data = post(&client, &api("model"), &body).await?;
            println!("{}", serde_json::to_string_pretty(&data)?);
        }

        Commands::Dup {
            candidate,
            corrodee,
        } => {
            let candidates = candidate
                .iter()
                .map(|r| parse_revision(r))
                .collect::<Result<Vec<_>, _>>()?;
            let corrodees = corrodee
                .iter()
                .map(|r| parse_revision(r))
                .collect::<Result<Vec<_>, _>>()?;
            let body = json!({ "candidates": candidates, "corrodees": corrodees });

            let data = post(&client, &api("dup"), &body).await?;
            println!("{}", serde_json::to_string_pretty(&data)?);
        }

        Commands::Record { group, event } => {
            let event: Value = serde_json::from_str(&event)?;
            let data = post(&client, &api(&format!("metrics/{}", group)), &event).await?;
            println!("Recorded {}", data["id"].as_str().unwrap_or("-"));
        }

        Commands::Metrics {
            group,
            user,
            field,
            mode,
            unit,
            limit,
            class_ids,
        } => {
            let body = json!({
                "user_id": user,
                "field": field,
                "mode": mode,
                "unit": unit,
                "limit": limit,
                "class_ids": class_ids,
            });
            let data = post(&client, &api(&format!("metrics/{}/query", group)), &body).await?;

            if cli.format == "json" {
                println!("{}", serde_json::to_string_pretty(&data)?);
            } else {
                println!("{:<24} {}", "Legend", "Count");
                println!("{}", "-".repeat(32));
                for point in data.as_array().into_iter().flatten() {
                    println!(
                        "{:<24} {}",
                        point["legend"].as_str().unwrap_or("-"),
                        point["count"].as_u64().unwrap_or(0)
                    );
                }
            }
        }

        Commands::Status => {
            let response = client.get(format!("{}/health", cli.api_url)).send().await;

            match response {
                Ok(resp) if resp.status().is_success() => {
                    let health: Value = resp.json().await?;
                    println!("Datalens v{}", env!("CARGO_PKG_VERSION"));
                    println!();
                    println!("API Status: {}", health["status"].as_str().unwrap_or("unknown"));
                    println!("Index store: {}", health["index_store"].as_str().unwrap_or("unknown"));
                    if let Some(uptime) = health["uptime_seconds"].as_u64() {
                        println!("Uptime: {}", format_duration(uptime));
                    }
                }
                Ok(resp) => {
                    eprintln!("API returned error: {}", resp.status());
                    std::process::exit(1);
                }
                Err(e) => {
                    eprintln!("Cannot connect to Datalens API at {}", cli.api_url);
                    eprintln!("Error: {}", e);
                    eprintln!();
                    eprintln!("Make sure the Datalens server is running:");
                    eprintln!("  cargo run --bin datalens");
                    std::process::exit(1);
                }
            }
        }

        Commands::Config { output } => {
            let config = datalens::config::generate_default_config();

            match output {
                Some(path) => {
                    if let Some(parent) = path.parent() {
                        std::fs::create_dir_all(parent)?;
                    }
                    std::fs::write(&path, &config)?;
                    println!("Config written to {:?}", path);
                }
                None => {
                    print!("{}", config);
                }
            }
        }
    }

    Ok(())
}

/// POST a JSON body; exits with the server's error message on failure
async fn post(client: &reqwest::Client, url: &str, body: &Value) -> Result<Value, reqwest::Error> {
    let response = client.post(url).json(body).send().await?;

    if !response.status().is_success() {
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<Value>(&text)
            .ok()
            .and_then(|v| {
                let code = v["error"]["code"].as_str()?.to_string();
                let message = v["error"]["message"].as_str()?.to_string();
                Some(format!("{}: {}", code, message))
            })
            .unwrap_or(text);
        eprintln!("Request failed ({}): {}", status, message);
        std::process::exit(1);
    }

    response.json().await
}

/// `user/repo/branch@task` into a request revision object
fn parse_revision(s: &str) -> Result<Value, String> {
    let invalid = || format!("Invalid revision {:?}. Use: user/repo/branch@task", s);

    let mut parts = s.splitn(3, '/');
    let (user, repo, rest) = match (parts.next(), parts.next(), parts.next()) {
        (Some(u), Some(r), Some(rest)) if !u.is_empty() && !r.is_empty() => (u, r, rest),
        _ => return Err(invalid()),
    };
    let (branch, task) = rest.split_once('@').ok_or_else(invalid)?;
    if branch.is_empty() || task.is_empty() {
        return Err(invalid());
    }

    Ok(json!({
        "user_id": user,
        "repo_id": repo,
        "branch_id": branch,
        "task_id": task,
    }))
}

fn upper(codes: Vec<String>) -> Vec<String> {
    codes.into_iter().map(|c| c.to_uppercase()).collect()
}

fn print_assets(data: &Value) {
    let assets = match data["assets"].as_array() {
        Some(a) => a,
        None => {
            println!("No data");
            return;
        }
    };

    println!(
        "{} matching assets, page starts at #{}",
        data["total_assets_count"].as_u64().unwrap_or(0),
        data["anchor"].as_u64().unwrap_or(0)
    );
    println!();
    println!("{:<40} {:>11} {:>4} {:>5}  {}", "Asset", "Size", "GT", "Pred", "Classes");
    println!("{}", "-".repeat(80));

    for asset in assets {
        let size = format!(
            "{}x{}",
            asset["metadata"]["width"].as_u64().unwrap_or(0),
            asset["metadata"]["height"].as_u64().unwrap_or(0)
        );
        let classes: Vec<String> = asset["class_ids"]
            .as_array()
            .into_iter()
            .flatten()
            .filter_map(|c| c.as_i64().map(|c| c.to_string()))
            .collect();
        println!(
            "{:<40} {:>11} {:>4} {:>5}  {}",
            asset["asset_id"].as_str().unwrap_or("-"),
            size,
            asset["gt"].as_array().map(Vec::len).unwrap_or(0),
            asset["pred"].as_array().map(Vec::len).unwrap_or(0),
            classes.join(",")
        );
    }
}

fn print_stats(data: &Value) {
    println!("Assets: {}", data["total_assets_count"].as_u64().unwrap_or(0));
    println!("Bytes:  {}", data["total_assets_bytes"].as_u64().unwrap_or(0));
    println!("Index:  {}", data["index_status"].as_str().unwrap_or("-"));

    for layer in ["gt", "pred"] {
        let stats = &data[layer];
        println!();
        println!(
            "{}: {} annotations, {} positive / {} negative assets",
            layer,
            stats["annos_count"].as_u64().unwrap_or(0),
            stats["positive_assets_count"].as_u64().unwrap_or(0),
            stats["negative_assets_count"].as_u64().unwrap_or(0)
        );
        if let Some(classes) = stats["class_ids_count"].as_object() {
            for (class_id, count) in classes {
                println!("  class {:<8} {}", class_id, count.as_u64().unwrap_or(0));
            }
        }
    }

    if let Some(cks) = data["cks_count"].as_object() {
        if !cks.is_empty() {
            println!();
            println!("cks:");
            for (key, values) in cks {
                let values: Vec<String> = values
                    .as_object()
                    .into_iter()
                    .flatten()
                    .map(|(v, n)| format!("{}={}", v, n.as_u64().unwrap_or(0)))
                    .collect();
                println!("  {:<16} {}", key, values.join(" "));
            }
        }
    }
}

fn format_duration(seconds: u64) -> String {
    if seconds < 60 {
        format!("{}s", seconds)
    } else if seconds < 3600 {
        format!("{}m {}s", seconds / 60, seconds % 60)
    } else if seconds < 86400 {
        format!("{}h {}m", seconds / 3600, (seconds % 3600) / 60)
    } else {
        format!("{}d {}h", seconds / 86400, (seconds % 86400) / 3600)
    }
}

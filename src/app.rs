use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use clap::Parser;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use tokio::sync::mpsc;
use tokio::task;
use tokio::time::Instant;

use crate::backend::{FilterCriteria, HttpBackend, LookupKind, QueryBackend};
use crate::cli::args::CliArgs;
use crate::cli::validation;
use crate::config::{self, ConfigFile};
use crate::export;
use crate::loader::{LoadEvent, LoadOutcome, Loader};
use crate::render::{Surface, TableView, Viewport};

fn print_banner() {
    const BANNER: &str = r#"
            _            _
   ___  __| |_ ____   _(_) _____      __
  / __|/ _` | '__\ \ / / | |/ _ \ \/\ / /
 | (__| (_| | |   \ V /| | |  __/\ V V /
  \___|\__,_|_|    \_/ |_|_|\___| \_/\_/
       v0.2.1 - progressive report fetcher
    "#;
    print!("{}", BANNER);
    println!();
}

fn format_kv_line(label: &str, value: &str) {
    println!(":: {:<10}: {}", label, value);
}

#[derive(Clone, Debug)]
struct RunConfig {
    base_url: String,
    timeout: u64,
    criteria: FilterCriteria,
    output: Option<String>,
    preview: bool,
    no_color: bool,
    list: Option<LookupKind>,
}

fn opt_value(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn build_run_config(args: CliArgs, cfg: ConfigFile) -> Result<RunConfig, String> {
    validation::validate(&args)?;

    let base_url = opt_value(args.url)
        .or_else(|| opt_value(cfg.base_url))
        .ok_or_else(|| "a report API base URL is required (--url or config base_url)".to_string())?;

    let timeout = args.timeout.or(cfg.timeout).unwrap_or(30);
    let no_color = args.no_color || cfg.no_color.unwrap_or(false);
    let preview = args.preview || cfg.preview.unwrap_or(false);
    let output = opt_value(args.output)
        .or_else(|| opt_value(cfg.output))
        .map(|p| config::expand_tilde_string(&p));

    // Already validated; parse again to carry the typed kind.
    let list = args.list.as_deref().and_then(LookupKind::parse);

    let criteria = FilterCriteria {
        start: args.start.unwrap_or_default().trim().to_string(),
        end: args.end.unwrap_or_default().trim().to_string(),
        contact_number: opt_value(args.contact),
        agent_name: opt_value(args.agent),
        extension: opt_value(args.extension),
        queue_name: opt_value(args.queue),
        record_type: opt_value(args.record_type),
        agent_disposition: opt_value(args.disposition),
        sub_disposition1: opt_value(args.sub_disposition1),
        sub_disposition2: opt_value(args.sub_disposition2),
        status: opt_value(args.status),
        campaign_type: opt_value(args.campaign_type),
        country: opt_value(args.country),
        transfer: args.transferred,
    };

    Ok(RunConfig {
        base_url,
        timeout,
        criteria,
        output,
        preview,
        no_color,
        list,
    })
}

/// Streams table content to the terminal. A terminal cannot erase what it
/// already wrote, so `rebuild` prints only the rows beyond those on screen.
struct TermSurface {
    pb: ProgressBar,
    printed: usize,
    header_printed: bool,
}

impl TermSurface {
    fn new(pb: ProgressBar) -> Self {
        Self {
            pb,
            printed: 0,
            header_printed: false,
        }
    }

    fn line(cells: &[String]) -> String {
        cells.join(" | ")
    }
}

impl Surface for TermSurface {
    fn rebuild(&mut self, header: &[String], rows: &[Vec<String>]) {
        if !self.header_printed {
            self.pb.println(Self::line(header).bold().to_string());
            self.header_printed = true;
        }
        if rows.len() > self.printed {
            for row in &rows[self.printed..] {
                self.pb.println(Self::line(row));
            }
            self.printed = rows.len();
        }
    }

    fn append(&mut self, rows: &[Vec<String>]) {
        for row in rows {
            self.pb.println(Self::line(row));
        }
        self.printed += rows.len();
    }
}

async fn run_async(run: RunConfig) -> Result<(), String> {
    if run.no_color {
        colored::control::set_override(false);
    }
    print_banner();

    let backend = HttpBackend::new(&run.base_url, run.timeout)
        .map_err(|e| format!("failed to build http client: {e}"))?;

    if let Some(kind) = run.list {
        let from_ts = crate::utils::parse_local_timestamp(&run.criteria.start)?;
        let to_ts = crate::utils::parse_local_timestamp(&run.criteria.end)?;
        let values = backend
            .fetch_lookup(kind, from_ts, to_ts)
            .await
            .map_err(|e| e.user_message())?;
        for value in values {
            println!("{value}");
        }
        return Ok(());
    }

    format_kv_line("Server", &run.base_url);
    format_kv_line(
        "Range",
        &format!("{} -> {}", run.criteria.start, run.criteria.end),
    );
    println!();

    let pb = ProgressBar::new(1);
    pb.set_draw_target(ProgressDrawTarget::stderr());
    pb.enable_steady_tick(Duration::from_millis(200));
    pb.set_style(
        ProgressStyle::with_template(
            ":: Progress: [{pos}/{len}] :: Duration: [{elapsed_precise}] :: {msg}",
        )
        .map_err(|e| format!("failed to build progress bar style: {e}"))?
        .progress_chars(r#"#>-"#),
    );

    let now = Instant::now();
    let loader = Loader::new(Arc::new(backend));
    let (event_tx, mut event_rx) = mpsc::channel::<LoadEvent>(256);

    let consumer = task::spawn({
        let pb = pb.clone();
        let loader = loader.clone();
        let preview = run.preview;
        async move {
            let mut view = TableView::new(TermSurface::new(pb.clone()));
            while let Some(event) = event_rx.recv().await {
                match event {
                    LoadEvent::SlowInit => {
                        pb.println(
                            "the report query is taking longer than expected, hang tight"
                                .yellow()
                                .to_string(),
                        );
                    }
                    LoadEvent::Started {
                        total_pages,
                        total_records,
                    } => {
                        pb.set_length(total_records.max(1));
                        pb.set_message(format!("0/{total_pages} pages"));
                    }
                    LoadEvent::Progress {
                        loaded_records,
                        total_records,
                        pages_fetched,
                        total_pages,
                    } => {
                        pb.set_position(loaded_records);
                        pb.set_message(format!(
                            "{pages_fetched}/{total_pages} pages :: {loaded_records}/{total_records} records"
                        ));
                        if preview {
                            let records = loader.records().await;
                            view.on_batch(&records, false);
                        }
                    }
                    LoadEvent::PageDropped { page, message } => {
                        pb.println(format!("{} page {page}: {message}", "dropped".yellow()));
                    }
                    LoadEvent::Complete { .. } => {
                        if preview {
                            let records = loader.records().await;
                            view.on_batch(&records, true);
                            // Page through the tail the same way a reader
                            // scrolling to the bottom would.
                            loop {
                                let appended =
                                    view.on_scroll(Viewport::at_bottom(), &records).await;
                                if appended == 0 {
                                    break;
                                }
                            }
                        }
                    }
                }
            }
        }
    });

    let outcome = loader.start_query(run.criteria.clone(), event_tx).await;
    let _ = consumer.await;
    pb.finish_and_clear();

    let load_error = match outcome {
        Ok(LoadOutcome::Completed(summary)) => {
            format_kv_line("Records", &summary.total_records.to_string());
            let breakdown = summary
                .by_record_type
                .iter()
                .map(|(category, count)| format!("{category}={count}"))
                .collect::<Vec<_>>()
                .join(" ");
            if !breakdown.is_empty() {
                format_kv_line("Breakdown", &breakdown);
            }
            None
        }
        Ok(LoadOutcome::Superseded) => None,
        Err(error) => Some(error),
    };

    let records = loader.records().await;
    if let Some(error) = &load_error {
        eprintln!("{}", error.user_message().red());
        if !records.is_empty() {
            format_kv_line(
                "Partial",
                &format!("{} records loaded before the failure are kept", records.len()),
            );
        }
    }

    if records.is_empty() {
        if load_error.is_none() {
            println!("{}", "nothing to export: the result set is empty".yellow());
        }
    } else {
        let path = run
            .output
            .clone()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(export::default_filename(&Local::now())));
        export::export_to_path(&records, &path)
            .await
            .map_err(|e| e.to_string())?;
        format_kv_line("Export", &path.display().to_string());
    }

    if load_error.is_some() {
        return Err("report load did not complete".to_string());
    }

    println!();
    println!(
        ":: Completed :: load took {}s ::",
        now.elapsed().as_secs()
    );
    Ok(())
}

pub fn run_cli() -> Result<(), String> {
    let args = CliArgs::parse();

    let cfg = match args.config.as_ref() {
        Some(path) => config::load_config(&config::expand_tilde(path), false)?,
        None => match config::default_config_path() {
            Some(path) => config::load_config(&path, true)?,
            None => ConfigFile::default(),
        },
    };

    let run = build_run_config(args, cfg)?;

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| format!("failed to build runtime: {e}"))?;

    rt.block_on(run_async(run))
}

//! Command implementations

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::app::IndexService;
use crate::cli::args::{CaptionsArgs, IndexArgs, JobsArgs, RebuildArgs, StatusArgs};
use crate::domain::model::{EpisodeKey, EpisodeState, JobId, JobSummary};
use crate::output::StatusMap;
use crate::utils::format_duration;
use crate::utils::time::TimestampParser;

fn parse_job_id(id: &str) -> Result<JobId> {
    JobId::new(id).with_context(|| format!("invalid job id {:?}", id))
}

/// Execute the index command. Ctrl-C cancels the job and stops its tools.
pub async fn index(service: &IndexService, args: IndexArgs) -> Result<()> {
    let job_id = match &args.id {
        Some(id) => parse_job_id(id)?,
        None => JobId::generate(),
    };
    info!(job_id = %job_id, input = %args.input.display(), "Executing index command");

    let run = service.start(job_id.clone(), args.input.clone(), args.metadata());
    tokio::pin!(run);

    let result = tokio::select! {
        result = &mut run => result,
        _ = tokio::signal::ctrl_c() => {
            warn!(job_id = %job_id, "Interrupted, cancelling job");
            service.cancel(&job_id);
            // keep polling the job so its tools can observe the signals
            let (result, report) = tokio::join!(run, service.shutdown(None));
            info!(interrupted = report.interrupted, killed = report.killed, "Tools stopped");
            result
        }
    };

    let summary = result.with_context(|| format!("indexing job {} failed", job_id))?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }
    Ok(())
}

fn print_summary(summary: &JobSummary) {
    let elapsed = (summary.finished_at - summary.started_at)
        .to_std()
        .unwrap_or_default();
    println!(
        "Job {}: {} episodes ({} done, {} indexing, {} pending) in {}",
        summary.job_id,
        summary.episodes.len(),
        summary.count_in_state(EpisodeState::Done),
        summary.count_in_state(EpisodeState::Indexing),
        summary.count_in_state(EpisodeState::Pending),
        format_duration(elapsed)
    );
    for episode in &summary.episodes {
        println!(
            "  S{:02}E{:02}  media:{:<3}  subtitles:{:<3}  {}",
            episode.season,
            episode.episode,
            if episode.media { "yes" } else { "no" },
            if episode.subtitles { "yes" } else { "no" },
            episode.state
        );
    }
}

/// Execute the status command
pub async fn status(service: &IndexService, args: StatusArgs) -> Result<()> {
    let job_id = parse_job_id(&args.id)?;
    let mut snapshot = service.status(&job_id).await;
    if let Some(wanted) = args.state {
        for episodes in snapshot.values_mut() {
            episodes.retain(|_, state| *state == wanted);
        }
        snapshot.retain(|_, episodes| !episodes.is_empty());
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        print_status(&job_id, &snapshot);
    }
    Ok(())
}

fn print_status(job_id: &JobId, snapshot: &StatusMap) {
    if snapshot.is_empty() {
        println!("Job {}: no episodes tracked", job_id);
        return;
    }
    println!("Job {}", job_id);
    for (season, episodes) in snapshot {
        for (episode, state) in episodes {
            println!("  S{:02}E{:02}  {}", season, episode, state);
        }
    }
}

/// Execute the captions command
pub async fn captions(service: &IndexService, args: CaptionsArgs) -> Result<()> {
    let job_id = parse_job_id(&args.id)?;
    let workspace = service.workspace(&job_id);
    let path = match (args.season, args.episode) {
        (Some(season), Some(episode)) => workspace.episode_document(EpisodeKey::new(season, episode)),
        (Some(season), None) => workspace.season_document(season),
        _ => workspace.series_document(),
    };

    let rows = service
        .documents(&job_id)
        .read_document(&path)
        .await
        .with_context(|| format!("cannot read {}", path.display()))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }
    for row in rows {
        println!(
            "S{:02}E{:02} #{:<4} {} --> {}  {}",
            row.season,
            row.episode,
            row.subtitle_index,
            TimestampParser::format_frame(row.start_frame),
            TimestampParser::format_frame(row.end_frame),
            row.text.replace('\n', " / ")
        );
    }
    Ok(())
}

/// Execute the rebuild command
pub async fn rebuild(service: &IndexService, args: RebuildArgs) -> Result<()> {
    let job_id = parse_job_id(&args.id)?;
    if service.is_running(&job_id) {
        anyhow::bail!("job {} is running", job_id);
    }
    let report = service
        .documents(&job_id)
        .rebuild_rollups()
        .await
        .with_context(|| format!("rebuilding documents of job {} failed", job_id))?;
    println!(
        "Rebuilt {} season documents and the series document from {} episodes ({} rows)",
        report.seasons, report.episodes, report.rows
    );
    Ok(())
}

/// Execute the jobs command
pub async fn jobs(service: &IndexService, args: JobsArgs) -> Result<()> {
    let records = service
        .previous_jobs()
        .await
        .context("listing previous jobs failed")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }
    if records.is_empty() {
        println!("No previous jobs");
        return Ok(());
    }
    for record in records {
        let folder = record
            .folder_path
            .as_deref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "-".to_string());
        let title = if record.metadata.title.is_empty() {
            "(untitled)"
        } else {
            record.metadata.title.as_str()
        };
        println!("{}  {} {}  {}", record.job_id, record.metadata.emoji, title, folder);
    }
    Ok(())
}

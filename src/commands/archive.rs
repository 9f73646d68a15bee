//! Archive sync command handlers: check, upload and verify.

use anyhow::{Result, bail};
use manual_archiver_core::archive::{
    ArchiveCredentials, CheckOptions, CheckPacing, UploadOptions, verify_archived,
};
use manual_archiver_core::download::DelayRange;
use manual_archiver_core::{ArchiveChecker, ArchiveClient, Catalog, Config, Uploader};
use tracing::info;

use crate::ProcessExit;
use crate::app::exit_handler;
use crate::cli::{CheckArchiveArgs, UploadArgs, VerifyArgs};

pub async fn run_check_archive_command(
    args: &CheckArchiveArgs,
    config: &Config,
    catalog: &Catalog,
) -> Result<ProcessExit> {
    if args.stats {
        let stats = catalog.archive_check_stats(args.source).await?;
        println!("Checkable items:      {}", stats.total_checkable);
        println!("Found on archive:     {}", stats.archived);
        println!("Checked, not found:   {}", stats.checked_not_archived);
        println!("Never checked:        {}", stats.never_checked);
        return Ok(ProcessExit::Success);
    }

    let pacing = pacing_with_overrides(
        CheckPacing::from_config(&config.archive),
        args.delay_min,
        args.delay_max,
    )?;
    let checker = ArchiveChecker::new(catalog.clone(), ArchiveClient::new(None)?, pacing);
    let options = CheckOptions {
        source: args.source,
        limit: args.limit,
        continuous: args.continuous,
    };

    let summary = tokio::select! {
        result = checker.run(&options) => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted; progress so far is saved");
            return Ok(ProcessExit::Success);
        }
    };
    println!(
        "Checked {} items: {} found on the archive, {} probe errors.",
        summary.checked, summary.found, summary.errors
    );
    Ok(exit_handler::determine_exit_outcome(
        summary.checked - summary.errors,
        summary.errors,
    ))
}

fn pacing_with_overrides(
    mut pacing: CheckPacing,
    delay_min: Option<u64>,
    delay_max: Option<u64>,
) -> Result<CheckPacing> {
    if delay_min.is_none() && delay_max.is_none() {
        return Ok(pacing);
    }
    let min = delay_min.unwrap_or_else(|| pacing.delay.min().as_secs());
    let max = delay_max.unwrap_or_else(|| pacing.delay.max().as_secs().max(min));
    if min > max {
        bail!("--delay-min ({min}s) must not exceed --delay-max ({max}s)");
    }
    pacing.delay = DelayRange::from_secs(min, max);
    Ok(pacing)
}

pub async fn run_upload_command(
    args: &UploadArgs,
    config: &Config,
    catalog: &Catalog,
) -> Result<ProcessExit> {
    let client = ArchiveClient::new(ArchiveCredentials::from_config(&config.archive))?;
    let options = UploadOptions {
        source: args.source,
        limit: args.limit,
        dry_run: args.dry_run,
    };
    let summary = Uploader::new(catalog.clone(), client).run(&options).await?;

    if args.dry_run {
        if summary.previews.is_empty() {
            println!("Nothing to upload.");
        }
        for preview in &summary.previews {
            println!(
                "[dry-run] #{} {} -> {} ({})",
                preview.item_id,
                preview.file.display(),
                preview.metadata.identifier,
                preview.metadata.title
            );
        }
        return Ok(ProcessExit::Success);
    }

    println!(
        "Uploaded {}, already present {}, failed {}.",
        summary.uploaded, summary.already_present, summary.failed
    );
    Ok(exit_handler::determine_exit_outcome(
        summary.uploaded + summary.already_present,
        summary.failed,
    ))
}

pub async fn run_verify_archive_command(
    args: &VerifyArgs,
    config: &Config,
    catalog: &Catalog,
) -> Result<ProcessExit> {
    let client = ArchiveClient::new(None)?;
    let report = verify_archived(
        catalog,
        &client,
        args.source,
        args.fix,
        config.archive.check_delay(),
    )
    .await?;

    for item in &report.missing {
        println!(
            "missing: #{} {} ({})",
            item.id,
            item.label(),
            item.archive_url.as_deref().unwrap_or("-")
        );
    }
    println!(
        "Verified {} archived items: {} missing, {} probe errors{}.",
        report.checked,
        report.missing.len(),
        report.errors,
        if args.fix {
            format!(", {} reset to not archived", report.fixed)
        } else {
            String::new()
        }
    );

    if !report.missing.is_empty() && !args.fix {
        return Ok(ProcessExit::Partial);
    }
    Ok(if report.errors > 0 {
        ProcessExit::Partial
    } else {
        ProcessExit::Success
    })
}

#[cfg(test)]
mod tests {
    use super::pacing_with_overrides;
    use manual_archiver_core::archive::CheckPacing;
    use std::time::Duration;

    #[test]
    fn test_pacing_overrides_keep_config_when_absent() {
        let pacing = pacing_with_overrides(CheckPacing::none(), None, None).unwrap();
        assert_eq!(pacing.delay.max(), Duration::ZERO);
    }

    #[test]
    fn test_pacing_overrides_apply_both_bounds() {
        let pacing = pacing_with_overrides(CheckPacing::none(), Some(2), Some(4)).unwrap();
        assert_eq!(pacing.delay.min(), Duration::from_secs(2));
        assert_eq!(pacing.delay.max(), Duration::from_secs(4));
    }

    #[test]
    fn test_pacing_overrides_raise_max_to_min() {
        let pacing = pacing_with_overrides(CheckPacing::none(), Some(7), None).unwrap();
        assert_eq!(pacing.delay.min(), Duration::from_secs(7));
        assert_eq!(pacing.delay.max(), Duration::from_secs(7));
    }

    #[test]
    fn test_pacing_overrides_reject_inverted_range() {
        assert!(pacing_with_overrides(CheckPacing::none(), Some(9), Some(3)).is_err());
    }
}

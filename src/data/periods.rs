//! Processing of source periods once every source has been loaded.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{Datelike, TimeZone, Utc};
use tracing::{debug, warn};

use super::filters::{by_type, not};
use super::identifier::{Identifier, IdentifierKind, Period};
use super::repository::{Data, DataRepository};
use crate::error::{RepositoryError, Result};
use crate::util::time::{month_range, range_printable};

pub const READABLE_PERIOD_KEY: &str = "readable_period";
pub const OUT_FILE_NAME_KEY: &str = "out_file_name";

/// Source identifiers of every repository grouped by resource kind, each
/// group sorted by start.
fn sources_by_kind(repos: &[&DataRepository]) -> BTreeMap<String, Vec<(Identifier, Period)>> {
    let mut grouped: BTreeMap<String, Vec<(Identifier, Period)>> = BTreeMap::new();
    let sources = repos
        .iter()
        .flat_map(|repo| repo.filter_ids(by_type(IdentifierKind::Source, true)));
    for id in sources {
        if let Some(source) = id.as_source() {
            let kind = source.resource_kind().to_string();
            let period = source.period();
            grouped.entry(kind).or_default().push((id, period));
        }
    }
    for group in grouped.values_mut() {
        group.sort_by_key(|(_, period)| period.start_ts());
    }
    grouped
}

/// Fail on the first pair of sources of the same kind whose periods overlap,
/// looking across all of `repos` as if they were joined.
pub fn check_overlaps(repos: &[&DataRepository]) -> std::result::Result<(), RepositoryError> {
    for group in sources_by_kind(repos).values() {
        for pair in group.windows(2) {
            let (first, first_period) = &pair[0];
            let (second, second_period) = &pair[1];
            if first_period.end_ts() > second_period.start_ts() {
                return Err(RepositoryError::OverlappingPeriods {
                    first: first.to_string(),
                    second: second.to_string(),
                });
            }
        }
    }
    Ok(())
}

fn month_bounds(ts: i64) -> Option<(i64, i64)> {
    let dt = Utc.timestamp_opt(ts, 0).single()?;
    month_range(dt.month(), dt.year())
}

/// Rebuild a source-only repository with every period widened to whole months.
pub fn align_to_months(mut repo: DataRepository) -> Result<DataRepository> {
    let others = repo.filter_ids(not(by_type(IdentifierKind::Source, true)));
    if let Some(other) = others.first() {
        return Err(RepositoryError::NotSourceOnly(other.to_string()).into());
    }
    check_overlaps(&[&repo])?;

    let grouped = sources_by_kind(&[&repo]);
    let mut aligned = DataRepository::new();

    for (kind, group) in grouped {
        for (id, period) in group {
            let (mut start, mut end) = period.bounds();

            if let Some((month_start, _)) = month_bounds(start) {
                if start != month_start {
                    warn!(
                        "Inferring time range start to the first second of the month {} -> {}",
                        start, month_start
                    );
                    start = month_start;
                }
            }
            if let Some((_, month_end)) = month_bounds(end) {
                if end != month_end {
                    warn!(
                        "Inferring time range end to the last second of the month {} -> {}",
                        end, month_end
                    );
                    end = month_end;
                }
            }

            let entry = repo.remove(&id)?;
            aligned.add(
                Identifier::source(start, end, kind.as_str())?,
                entry.data,
                Some(entry.metadata),
            )?;
        }
    }

    Ok(aligned)
}

/// Register one timestamps identifier per distinct source period.
///
/// Returns the number of periods newly registered.
pub fn register_periods(repo: &mut DataRepository) -> Result<usize> {
    let periods: BTreeSet<Period> = repo
        .ids()
        .iter()
        .filter_map(|id| id.as_source().map(|s| s.period()))
        .collect();

    let mut registered = 0;
    for period in periods {
        let id = Identifier::timestamps(period.start_ts(), period.end_ts())?;
        if !repo.contains(&id) {
            debug!("Registering period {}", id);
            repo.add(id, Data::Empty, None)?;
            registered += 1;
        }
    }
    Ok(registered)
}

/// Make a readable period label safe for file names.
pub fn fs_compatible(readable: &str) -> String {
    readable.replace('/', "_").replace(' ', "T").replace(':', "")
}

/// Attach `readable_period` and `out_file_name` to every source entry.
///
/// `step` is the query resolution in seconds, used as the grace window when
/// deciding whether a period is a whole month.
pub fn attach_period_labels(repo: &mut DataRepository, step: i64) -> Result<()> {
    for id in repo.filter_ids(by_type(IdentifierKind::Source, true)) {
        let Some(source) = id.as_source() else {
            continue;
        };
        let (start, end) = source.period().bounds();
        let readable = range_printable(start, end, step);
        let out_file_name = format!("{}-{}", source.resource_kind(), fs_compatible(&readable));

        let mut metadata = repo.get_metadata(&id)?.clone();
        metadata.insert(READABLE_PERIOD_KEY.to_string(), readable.into());
        metadata.insert(OUT_FILE_NAME_KEY.to_string(), out_file_name.into());
        repo.update_metadata(&id, metadata)?;
    }
    Ok(())
}

/// Readable period of the source an identifier is based on.
pub fn readable_period_of(repo: &DataRepository, id: &Identifier) -> Option<String> {
    let base = id.base()?;
    if let Ok(metadata) = repo.get_metadata(base) {
        if let Some(label) = metadata.get(READABLE_PERIOD_KEY).and_then(|v| v.as_str()) {
            return Some(label.to_string());
        }
    }
    base.period()
        .map(|period| range_printable(period.start_ts(), period.end_ts(), 0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    const JAN_2024: (i64, i64) = (1_704_067_200, 1_706_745_599);
    const FEB_2024: (i64, i64) = (1_706_745_600, 1_709_251_199);

    fn src(start: i64, end: i64, kind: &str) -> Identifier {
        Identifier::source(start, end, kind).unwrap()
    }

    #[test]
    fn test_check_overlaps_per_kind() {
        let mut repo = DataRepository::new();
        repo.add(src(0, 10, "cpu"), Data::Empty, None).unwrap();
        repo.add(src(5, 20, "gpu"), Data::Empty, None).unwrap();
        repo.add(src(10, 20, "cpu"), Data::Empty, None).unwrap();
        assert!(check_overlaps(&[&repo]).is_ok());

        repo.add(src(15, 30, "cpu"), Data::Empty, None).unwrap();
        let err = check_overlaps(&[&repo]).unwrap_err();
        assert_eq!(
            err,
            RepositoryError::OverlappingPeriods {
                first: "sourcedata cpu:10-20".to_string(),
                second: "sourcedata cpu:15-30".to_string(),
            }
        );
    }

    #[test]
    fn test_check_overlaps_across_repositories() {
        let mut joined = DataRepository::new();
        joined.add(src(0, 10, "cpu"), Data::Empty, None).unwrap();
        let mut loaded = DataRepository::new();
        loaded.add(src(20, 30, "cpu"), Data::Empty, None).unwrap();
        assert!(check_overlaps(&[&joined, &loaded]).is_ok());

        loaded.add(src(5, 15, "cpu"), Data::Empty, None).unwrap();
        assert!(check_overlaps(&[&loaded]).is_ok());
        assert!(check_overlaps(&[&joined, &loaded]).is_err());
    }

    #[test]
    fn test_align_to_months() {
        let mut repo = DataRepository::new();
        repo.add(src(JAN_2024.0 + 3600, JAN_2024.1 - 3600, "cpu"), Data::Integer(1), None)
            .unwrap();
        repo.add(src(FEB_2024.0, FEB_2024.1, "cpu"), Data::Integer(2), None)
            .unwrap();

        let aligned = align_to_months(repo).unwrap();
        assert_eq!(aligned.count(), 2);
        assert_eq!(
            aligned.get_data(&src(JAN_2024.0, JAN_2024.1, "cpu")).unwrap(),
            &Data::Integer(1)
        );
        assert!(aligned.contains(&src(FEB_2024.0, FEB_2024.1, "cpu")));
    }

    #[test]
    fn test_align_rejects_non_sources() {
        let mut repo = DataRepository::new();
        repo.add(src(0, 10, "cpu"), Data::Empty, None).unwrap();
        repo.add(Identifier::analysis(Some(src(0, 10, "cpu")), "cpuhours"), Data::Empty, None)
            .unwrap();
        let err = align_to_months(repo).unwrap_err();
        assert!(matches!(err, Error::Repository(RepositoryError::NotSourceOnly(_))));
    }

    #[test]
    fn test_register_periods_dedupes_kinds() {
        let mut repo = DataRepository::new();
        repo.add(src(0, 10, "cpu"), Data::Empty, None).unwrap();
        repo.add(src(0, 10, "gpu"), Data::Empty, None).unwrap();
        repo.add(src(20, 30, "cpu"), Data::Empty, None).unwrap();

        assert_eq!(register_periods(&mut repo).unwrap(), 2);
        assert_eq!(register_periods(&mut repo).unwrap(), 0);
        assert!(repo.contains(&Identifier::timestamps(0, 10).unwrap()));
        assert!(repo.contains(&Identifier::timestamps(20, 30).unwrap()));
    }

    #[test]
    fn test_attach_period_labels() {
        let mut repo = DataRepository::new();
        let month = src(JAN_2024.0, JAN_2024.1, "cpu");
        let partial = src(JAN_2024.0, JAN_2024.0 + 3600, "gpu");
        repo.add(month.clone(), Data::Empty, None).unwrap();
        repo.add(partial.clone(), Data::Empty, None).unwrap();

        attach_period_labels(&mut repo, 3600).unwrap();

        let metadata = repo.get_metadata(&month).unwrap();
        assert_eq!(metadata[READABLE_PERIOD_KEY], "January24");
        assert_eq!(metadata[OUT_FILE_NAME_KEY], "cpu-January24");

        let metadata = repo.get_metadata(&partial).unwrap();
        assert_eq!(metadata[OUT_FILE_NAME_KEY], "gpu-1_1_2024T000-1_1_2024T100");

        let analysis = Identifier::analysis(Some(month), "cpuhours");
        assert_eq!(readable_period_of(&repo, &analysis), Some("January24".to_string()));
    }
}

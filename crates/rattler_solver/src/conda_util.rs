use crate::id::{NameId, RepoId, SolvableId};
use crate::solvable::Solvable;
use rattler_conda_types::{MatchSpec, PackageRecord, Version};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::str::FromStr;

/// Returns the order of two candidates based on rules used by conda.
///
/// Implements the tie-break chain in priority order: pinned (`jobs.lock`) candidates first,
/// then already-installed, then repo registration order (first-listed channel wins), then
/// version/build_number/track_features/build_string, falling back to insertion order
/// (`SolvableId`) so the result is fully deterministic given the pool's insertion order.
#[allow(clippy::too_many_arguments)]
pub(crate) fn compare_candidates(
    solvables: &[Solvable],
    interned_strings: &HashMap<String, NameId>,
    packages_by_name: &[Vec<SolvableId>],
    installed_repo: Option<RepoId>,
    locked: &HashSet<SolvableId>,
    a_id: SolvableId,
    b_id: SolvableId,
) -> Ordering {
    let a = solvables[a_id.index()].package().record;
    let b = solvables[b_id.index()].package().record;

    // Explicitly pinned (`jobs.lock`) candidates sort first. The solver also enforces this as
    // a hard conflict rule; this keeps the candidate order consistent with that enforcement.
    match locked.contains(&b_id).cmp(&locked.contains(&a_id)) {
        Ordering::Equal => {}
        ord => return ord,
    }

    // Already-installed candidates are preferred over a fresh install of the same name.
    let a_installed = installed_repo == Some(solvables[a_id.index()].package().repo_id());
    let b_installed = installed_repo == Some(solvables[b_id.index()].package().repo_id());
    match b_installed.cmp(&a_installed) {
        Ordering::Equal => {}
        ord => return ord,
    }

    // Repos are registered in channel priority order: the repo registered first wins.
    match solvables[a_id.index()]
        .package()
        .repo_id()
        .cmp(&solvables[b_id.index()].package().repo_id())
    {
        Ordering::Equal => {}
        ord => return ord,
    }

    // Otherwise, select the variant with the highest epoch/version (`Version::cmp` orders the
    // epoch ahead of the rest of the version per the version grammar).
    match a.version.cmp(&b.version) {
        Ordering::Less => return Ordering::Greater,
        Ordering::Greater => return Ordering::Less,
        Ordering::Equal => {}
    };

    // Otherwise, select the variant with the highest build number
    match a.build_number.cmp(&b.build_number) {
        Ordering::Less => return Ordering::Greater,
        Ordering::Greater => return Ordering::Less,
        Ordering::Equal => {}
    };

    // Otherwise, prefer the variant with fewer tracked features; a package with tracked
    // features is sorted below one that doesn't have any.
    let a_has_tracked_features = a.track_features.is_empty();
    let b_has_tracked_features = b.track_features.is_empty();
    match b_has_tracked_features.cmp(&a_has_tracked_features) {
        Ordering::Less => return Ordering::Less,
        Ordering::Greater => return Ordering::Greater,
        Ordering::Equal => {}
    };

    // Otherwise, compare the dependencies of the variants. If there are similar
    // dependencies select the variant that selects the highest version of the dependency.
    let a_match_specs: Vec<_> = a
        .depends
        .iter()
        .map(|d| MatchSpec::from_str(d).unwrap())
        .collect();
    let b_match_specs: Vec<_> = b
        .depends
        .iter()
        .map(|d| MatchSpec::from_str(d).unwrap())
        .collect();

    let b_specs_by_name: HashMap<_, _> = b_match_specs
        .iter()
        .filter_map(|spec| spec.name.as_ref().map(|name| (name, spec)))
        .collect();

    let a_specs_by_name = a_match_specs
        .iter()
        .filter_map(|spec| spec.name.as_ref().map(|name| (name, spec)));

    let mut total_score = 0;
    for (a_dep_name, a_spec) in a_specs_by_name {
        if let Some(b_spec) = b_specs_by_name.get(&a_dep_name) {
            if &a_spec == b_spec {
                continue;
            }

            // Find which of the two specs selects the highest version
            let highest_a =
                find_highest_version(solvables, interned_strings, packages_by_name, a_spec);
            let highest_b =
                find_highest_version(solvables, interned_strings, packages_by_name, b_spec);

            // Skip version if no package is selected by either spec
            let (a_version, a_tracked_features, b_version, b_tracked_features) = if let (
                Some((a_version, a_tracked_features)),
                Some((b_version, b_tracked_features)),
            ) =
                (highest_a, highest_b)
            {
                (a_version, a_tracked_features, b_version, b_tracked_features)
            } else {
                continue;
            };

            // If one of the dependencies only selects versions with tracked features, down-
            // weight that variant.
            if let Some(score) = match a_tracked_features.cmp(&b_tracked_features) {
                Ordering::Less => Some(-100),
                Ordering::Greater => Some(100),
                Ordering::Equal => None,
            } {
                total_score += score;
                continue;
            }

            // Otherwise, down-weigh the version with the lowest selected version.
            total_score += match a_version.cmp(&b_version) {
                Ordering::Less => 1,
                Ordering::Equal => 0,
                Ordering::Greater => -1,
            };
        }
    }

    // If ranking the dependencies provides a score, use that for the sorting.
    match total_score.cmp(&0) {
        Ordering::Equal => {}
        ord => return ord,
    };

    // Otherwise, prefer the lexicographically smaller build string
    match a.build.cmp(&b.build) {
        Ordering::Equal => {}
        ord => return ord,
    };

    // Otherwise, order by timestamp
    match b.timestamp.cmp(&a.timestamp) {
        Ordering::Equal => {}
        ord => return ord,
    }

    // Finally, fall back to insertion order so the result is fully deterministic
    a_id.cmp(&b_id)
}

pub(crate) fn find_highest_version(
    solvables: &[Solvable],
    interned_strings: &HashMap<String, NameId>,
    packages_by_name: &[Vec<SolvableId>],
    match_spec: &MatchSpec,
) -> Option<(Version, bool)> {
    let name = match_spec.name.as_deref().unwrap();
    let name_id = interned_strings[name];

    // For each record that matches the spec
    let candidates = packages_by_name[name_id.index()]
        .iter()
        .map(|s| solvables[s.index()].package().record)
        .filter(|s| match_spec.matches(s));

    candidates.fold(None, |init, record| {
        Some(init.map_or_else(
            || (record.version.clone(), !record.track_features.is_empty()),
            |(version, has_tracked_features)| {
                (
                    version.max(record.version.clone()),
                    has_tracked_features && record.track_features.is_empty(),
                )
            },
        ))
    })
}

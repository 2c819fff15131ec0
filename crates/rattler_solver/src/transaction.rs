//! Turns the set of decisions the solver settled on into a [`Transaction`]: an ordered list of
//! per-package steps describing what should happen to the prefix, obtained by diffing the
//! solution against the pool's installed repo (see [`crate::Pool::set_installed_repo`]).

use crate::id::SolvableId;
use crate::pool::Pool;
use std::cmp::Ordering;
use std::fmt::{Display, Formatter};

/// What should happen to a single solvable as part of applying a [`Transaction`] to a prefix.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TransactionKind {
    /// No package of this name was installed before; link it into the prefix.
    Install,
    /// A package of this name was already installed and the solution kept the exact same
    /// solvable (same version, build and origin repo); nothing needs to change on disk, but the
    /// step is reported so callers can account for it.
    Reinstall,
    /// A package of this name was already installed and the solution selected a solvable with a
    /// greater version (or, for equal versions, a greater build number).
    Upgrade,
    /// A package of this name was already installed and the solution selected a solvable with a
    /// lesser version (or, for equal versions, a lesser build number).
    Downgrade,
    /// A package of this name was already installed, the version and build number are identical,
    /// but the solvable itself differs (e.g. a different build string or origin repo). Applied as
    /// an unlink of the old solvable followed by a link of the new one.
    Change,
    /// A package of this name was installed but is not part of the new solution; unlink it from
    /// the prefix.
    Remove,
}

impl Display for TransactionKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

/// The transaction that results from the jobs provided to the solver and the found solution.
///
/// Each step pairs a [`SolvableId`] with the [`TransactionKind`] describing what should happen to
/// it. [`TransactionKind::Remove`] steps reference a solvable from the pool's installed repo that
/// has no counterpart in the new solution; every other step references a solvable from the
/// solution itself.
pub struct Transaction {
    /// The steps that make up this transaction, in the order they should be applied.
    pub steps: Vec<(SolvableId, TransactionKind)>,
}

impl Transaction {
    /// Builds a [`Transaction`] by diffing the set of solvables the solver decided to install
    /// against the pool's installed repo (if one was registered with
    /// [`crate::Pool::set_installed_repo`]).
    pub(crate) fn from_solution(pool: &Pool, installed_solution: Vec<SolvableId>) -> Self {
        let mut steps = Vec::with_capacity(installed_solution.len());

        let mut previously_installed: Vec<SolvableId> = match pool.installed_repo() {
            Some(repo_id) => pool
                .solvables
                .iter()
                .enumerate()
                .skip(1) // skip the root solvable
                .filter_map(|(index, solvable)| {
                    let package = solvable.get_package()?;
                    (package.repo_id() == repo_id).then(|| SolvableId::new(index))
                })
                .collect(),
            None => Vec::new(),
        };

        for &new_id in &installed_solution {
            let new_record = pool.resolve_solvable(new_id).record;
            let previous_index = previously_installed.iter().position(|&old_id| {
                pool.resolve_solvable(old_id).record.name == new_record.name
            });

            let Some(previous_index) = previous_index else {
                steps.push((new_id, TransactionKind::Install));
                continue;
            };

            let old_id = previously_installed.remove(previous_index);
            let old_record = pool.resolve_solvable(old_id).record;

            let kind = if old_id == new_id {
                TransactionKind::Reinstall
            } else {
                match new_record
                    .version
                    .cmp(&old_record.version)
                    .then(new_record.build_number.cmp(&old_record.build_number))
                {
                    Ordering::Greater => TransactionKind::Upgrade,
                    Ordering::Less => TransactionKind::Downgrade,
                    Ordering::Equal => TransactionKind::Change,
                }
            };

            steps.push((new_id, kind));
        }

        // Anything still left in `previously_installed` wasn't part of the new solution at all.
        steps.extend(
            previously_installed
                .into_iter()
                .map(|old_id| (old_id, TransactionKind::Remove)),
        );

        Self { steps }
    }
}

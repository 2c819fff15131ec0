use crate::decision_map::DecisionMap;
use crate::id::{MatchSpecId, NameId};
use crate::pool::Pool;
use crate::id::SolvableId;
use crate::solver::RuleId;

#[derive(Clone)]
pub(crate) struct Rule {
    pub watched_literals: [SolvableId; 2],
    next_watches: [RuleId; 2],
    pub(crate) kind: RuleKind,
}

impl Rule {
    pub fn new(kind: RuleKind, learnt_rules: &[Vec<Literal>], pool: &Pool) -> Self {
        let watched_literals = kind
            .initial_watches(learnt_rules, pool)
            .unwrap_or([SolvableId::null(), SolvableId::null()]);

        let rule = Self {
            watched_literals,
            next_watches: [RuleId::null(), RuleId::null()],
            kind,
        };

        debug_assert!(!rule.has_watches() || watched_literals[0] != watched_literals[1]);

        rule
    }

    pub fn debug(&self, pool: &Pool) {
        match self.kind {
            RuleKind::InstallRoot => tracing::trace!("install root"),
            RuleKind::Learnt(index) => tracing::trace!("learnt rule {index}"),
            RuleKind::Job(match_spec_id) | RuleKind::Recommends(_, match_spec_id) => {
                let match_spec = pool.resolve_match_spec(match_spec_id).to_string();
                tracing::trace!("job requires {match_spec}")
            }
            RuleKind::PkgRequires(solvable_id, match_spec_id)
            | RuleKind::PkgRecommends(solvable_id, match_spec_id) => {
                let match_spec = pool.resolve_match_spec(match_spec_id).to_string();
                tracing::trace!(
                    "{} requires {match_spec}",
                    pool.resolve_solvable_inner(solvable_id).display()
                )
            }
            RuleKind::PkgConstrains(s1, s2) | RuleKind::PkgConflicts(s1, s2) => {
                tracing::trace!(
                    "{} excludes {}",
                    pool.resolve_solvable_inner(s1).display(),
                    pool.resolve_solvable_inner(s2).display()
                )
            }
            RuleKind::PkgSameName(s1, _) => {
                let name = pool
                    .resolve_solvable_inner(s1)
                    .package()
                    .record
                    .name
                    .as_str();
                tracing::trace!("only one {name} allowed")
            }
            RuleKind::PkgObsoletes(s1, s2)
            | RuleKind::PkgImplicitObsoletes(s1, s2)
            | RuleKind::PkgInstalledObsoletes(s1, s2)
            | RuleKind::Update(s1, s2)
            | RuleKind::StrictRepoPriority(s1, s2)
            | RuleKind::Yumobs(s1, s2) => {
                tracing::trace!(
                    "{} obsoletes/updates {}",
                    pool.resolve_solvable_inner(s1).display(),
                    pool.resolve_solvable_inner(s2).display()
                )
            }
            RuleKind::PkgNothingProvidesDep(solvable_id, match_spec_id) => {
                let match_spec = pool.resolve_match_spec(match_spec_id).to_string();
                tracing::trace!(
                    "nothing provides {match_spec}, required by {}",
                    pool.resolve_solvable_inner(solvable_id).display()
                )
            }
            RuleKind::JobNothingProvidesDep(match_spec_id) => {
                let match_spec = pool.resolve_match_spec(match_spec_id).to_string();
                tracing::trace!("nothing provides {match_spec}, requested by the job")
            }
            RuleKind::PkgNotInstallable(s) | RuleKind::PkgSelfConflict(s) => {
                tracing::trace!(
                    "{} is not installable",
                    pool.resolve_solvable_inner(s).display()
                )
            }
            RuleKind::JobUnknownPackage(name_id) => {
                tracing::trace!("unknown package {}", pool.resolve_package_name(name_id))
            }
            RuleKind::JobUnsupported => tracing::trace!("unsupported job"),
            RuleKind::JobProvidedBySystem(s) => {
                tracing::trace!(
                    "{} already provided by the base environment",
                    pool.resolve_solvable_inner(s).display()
                )
            }
            RuleKind::Feature(s) | RuleKind::Best(s) | RuleKind::Black(s)
            | RuleKind::Distupgrade(s) | RuleKind::Infarch(s) => {
                tracing::trace!(
                    "soft preference for {}",
                    pool.resolve_solvable_inner(s).display()
                )
            }
            RuleKind::Choice(_) => tracing::trace!("choice rule"),
        }
    }

    pub fn link_to_rule(&mut self, watch_index: usize, linked_rule: RuleId) {
        self.next_watches[watch_index] = linked_rule;
    }

    pub fn get_linked_rule(&self, watch_index: usize) -> RuleId {
        self.next_watches[watch_index]
    }

    pub fn unlink_rule(
        &mut self,
        linked_rule: &Rule,
        watched_solvable: SolvableId,
        linked_rule_watch_index: usize,
    ) {
        if self.watched_literals[0] == watched_solvable {
            self.next_watches[0] = linked_rule.next_watches[linked_rule_watch_index];
        } else {
            debug_assert_eq!(self.watched_literals[1], watched_solvable);
            self.next_watches[1] = linked_rule.next_watches[linked_rule_watch_index];
        }
    }

    pub fn next_watched_rule(&self, solvable_id: SolvableId) -> RuleId {
        if solvable_id == self.watched_literals[0] {
            self.next_watches[0]
        } else {
            debug_assert_eq!(self.watched_literals[1], solvable_id);
            self.next_watches[1]
        }
    }

    // Returns the index of the watch that turned false, if any
    pub fn watch_turned_false(
        &self,
        solvable_id: SolvableId,
        decision_map: &DecisionMap,
        learnt_rules: &[Vec<Literal>],
    ) -> Option<([Literal; 2], usize)> {
        debug_assert!(self.watched_literals.contains(&solvable_id));

        let literals @ [w1, w2] = self.watched_literals(learnt_rules);

        if solvable_id == w1.solvable_id && w1.eval(decision_map) == Some(false) {
            Some((literals, 0))
        } else if solvable_id == w2.solvable_id && w2.eval(decision_map) == Some(false) {
            Some((literals, 1))
        } else {
            None
        }
    }

    pub fn has_watches(&self) -> bool {
        // If the first watch is not null, the second won't be either
        !self.watched_literals[0].is_null()
    }

    pub fn watched_literals(&self, learnt_rules: &[Vec<Literal>]) -> [Literal; 2] {
        let literals = |op1: bool, op2: bool| {
            [
                Literal {
                    solvable_id: self.watched_literals[0],
                    negate: !op1,
                },
                Literal {
                    solvable_id: self.watched_literals[1],
                    negate: !op2,
                },
            ]
        };

        match self.kind {
            RuleKind::InstallRoot
            | RuleKind::JobNothingProvidesDep(_)
            | RuleKind::JobUnknownPackage(_)
            | RuleKind::JobUnsupported
            | RuleKind::JobProvidedBySystem(_)
            | RuleKind::PkgNothingProvidesDep(_, _)
            | RuleKind::PkgNotInstallable(_)
            | RuleKind::PkgSelfConflict(_)
            | RuleKind::Feature(_)
            | RuleKind::Best(_)
            | RuleKind::Black(_)
            | RuleKind::Distupgrade(_)
            | RuleKind::Infarch(_)
            | RuleKind::Choice(_) => unreachable!("rule kind has no two-literal watch pair"),
            RuleKind::Learnt(index) => {
                // TODO: this is probably not going to cut it for performance
                let &w1 = learnt_rules[index]
                    .iter()
                    .find(|l| l.solvable_id == self.watched_literals[0])
                    .unwrap();
                let &w2 = learnt_rules[index]
                    .iter()
                    .find(|l| l.solvable_id == self.watched_literals[1])
                    .unwrap();
                [w1, w2]
            }
            RuleKind::PkgSameName(_, _)
            | RuleKind::PkgConflicts(_, _)
            | RuleKind::PkgConstrains(_, _)
            | RuleKind::PkgObsoletes(_, _)
            | RuleKind::PkgImplicitObsoletes(_, _)
            | RuleKind::PkgInstalledObsoletes(_, _)
            | RuleKind::Update(_, _)
            | RuleKind::StrictRepoPriority(_, _)
            | RuleKind::Yumobs(_, _) => literals(false, false),
            RuleKind::PkgRequires(solvable_id, _) | RuleKind::PkgRecommends(solvable_id, _) => {
                if self.watched_literals[0] == solvable_id {
                    literals(false, true)
                } else if self.watched_literals[1] == solvable_id {
                    literals(true, false)
                } else {
                    literals(true, true)
                }
            }
            RuleKind::Job(_) | RuleKind::Recommends(_, _) => literals(true, true),
        }
    }

    pub fn next_unwatched_variable(
        &self,
        pool: &Pool,
        learnt_rules: &[Vec<Literal>],
        decision_map: &DecisionMap,
    ) -> Option<SolvableId> {
        // The next unwatched variable (if available), is a variable that is:
        // * Not already being watched
        // * Not yet decided, or decided in such a way that the literal yields true
        let can_watch = |solvable_lit: Literal| {
            !self.watched_literals.contains(&solvable_lit.solvable_id)
                && solvable_lit.eval(decision_map).unwrap_or(true)
        };

        match self.kind {
            RuleKind::Learnt(index) => learnt_rules[index]
                .iter()
                .cloned()
                .find(|&l| can_watch(l))
                .map(|l| l.solvable_id),
            RuleKind::PkgRequires(solvable_id, match_spec_id)
            | RuleKind::PkgRecommends(solvable_id, match_spec_id) => {
                // The solvable that added this rule
                let solvable_lit = Literal {
                    solvable_id,
                    negate: true,
                };
                if can_watch(solvable_lit) {
                    return Some(solvable_id);
                }

                // The available candidates
                for &candidate in pool.match_spec_to_candidates[match_spec_id.index()]
                    .as_deref()
                    .unwrap()
                {
                    let lit = Literal {
                        solvable_id: candidate,
                        negate: false,
                    };
                    if can_watch(lit) {
                        return Some(candidate);
                    }
                }

                None
            }
            RuleKind::Job(match_spec_id) | RuleKind::Recommends(_, match_spec_id) => {
                for &candidate in pool.match_spec_to_candidates[match_spec_id.index()]
                    .as_deref()
                    .unwrap()
                {
                    let lit = Literal {
                        solvable_id: candidate,
                        negate: false,
                    };
                    if can_watch(lit) {
                        return Some(candidate);
                    }
                }
                None
            }
            _ => None,
        }
    }

    /// Returns the list of literals that constitute this rule
    pub fn literals(&self, learnt_rules: &[Vec<Literal>], pool: &Pool) -> Vec<Literal> {
        match self.kind {
            RuleKind::InstallRoot => unreachable!(),
            RuleKind::Learnt(index) => learnt_rules[index].clone(),
            RuleKind::PkgRequires(solvable_id, match_spec_id)
            | RuleKind::PkgRecommends(solvable_id, match_spec_id) => requires_literals(
                Some(solvable_id),
                match_spec_id,
                pool,
            ),
            RuleKind::Job(match_spec_id) | RuleKind::Recommends(_, match_spec_id) => {
                requires_literals(None, match_spec_id, pool)
            }
            RuleKind::PkgSameName(s1, s2)
            | RuleKind::PkgConflicts(s1, s2)
            | RuleKind::PkgConstrains(s1, s2)
            | RuleKind::PkgObsoletes(s1, s2)
            | RuleKind::PkgImplicitObsoletes(s1, s2)
            | RuleKind::PkgInstalledObsoletes(s1, s2)
            | RuleKind::Update(s1, s2)
            | RuleKind::StrictRepoPriority(s1, s2)
            | RuleKind::Yumobs(s1, s2) => pair_literals(s1, s2),
            RuleKind::PkgNothingProvidesDep(s, _) => unit_false(s),
            RuleKind::PkgNotInstallable(s) => unit_false(s),
            RuleKind::PkgSelfConflict(s) => unit_false(s),
            RuleKind::JobNothingProvidesDep(_)
            | RuleKind::JobUnknownPackage(_)
            | RuleKind::JobUnsupported => unit_false(SolvableId::root()),
            RuleKind::JobProvidedBySystem(s)
            | RuleKind::Feature(s)
            | RuleKind::Best(s)
            | RuleKind::Black(s)
            | RuleKind::Distupgrade(s)
            | RuleKind::Infarch(s) => {
                vec![Literal {
                    solvable_id: s,
                    negate: false,
                }]
            }
            RuleKind::Choice(ref candidates) => candidates
                .iter()
                .map(|&solvable_id| Literal {
                    solvable_id,
                    negate: false,
                })
                .collect(),
        }
    }

    /// Returns the list of variables that imply that the provided solvable should be decided
    pub fn conflict_causes(
        &self,
        variable: SolvableId,
        learnt_rules: &[Vec<Literal>],
        pool: &Pool,
    ) -> Vec<Literal> {
        self.literals(learnt_rules, pool)
            .into_iter()
            .filter(|lit| lit.solvable_id != variable)
            .collect()
    }
}

fn requires_literals(requirer: Option<SolvableId>, match_spec_id: MatchSpecId, pool: &Pool) -> Vec<Literal> {
    let candidates = pool.match_spec_to_candidates[match_spec_id.index()]
        .as_deref()
        .unwrap()
        .iter()
        .cloned()
        .map(|solvable_id| Literal {
            solvable_id,
            negate: false,
        });

    match requirer {
        Some(solvable_id) => std::iter::once(Literal {
            solvable_id,
            negate: true,
        })
        .chain(candidates)
        .collect(),
        None => candidates.collect(),
    }
}

fn pair_literals(s1: SolvableId, s2: SolvableId) -> Vec<Literal> {
    vec![
        Literal {
            solvable_id: s1,
            negate: true,
        },
        Literal {
            solvable_id: s2,
            negate: true,
        },
    ]
}

fn unit_false(s: SolvableId) -> Vec<Literal> {
    vec![Literal {
        solvable_id: s,
        negate: true,
    }]
}

#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub(crate) struct Literal {
    pub(crate) solvable_id: SolvableId,
    pub(crate) negate: bool,
}

impl Literal {
    pub(crate) fn satisfying_value(self) -> bool {
        !self.negate
    }

    pub(crate) fn eval(self, decision_map: &DecisionMap) -> Option<bool> {
        decision_map
            .value(self.solvable_id)
            .map(|value| self.eval_inner(value))
    }

    fn eval_inner(self, solvable_value: bool) -> bool {
        if self.negate {
            !solvable_value
        } else {
            solvable_value
        }
    }
}

/// The kind of a rule, mirroring the closed, stably-named rule-kind set a
/// libsolv-lineage solver reports problems against. Every variant below maps
/// 1:1 onto a `SOLVER_RULE_*` constant from the original C solver; keeping the
/// same names means problem output and `ProblemsGraph::conflict_map` entries
/// stay self-describing without an extra translation table.
#[derive(Copy, Clone, Debug)]
pub(crate) enum RuleKind {
    InstallRoot,
    /// A package requires the candidates associated to a match spec.
    ///
    /// In SAT terms: (¬A ∨ B1 ∨ B2 ∨ ... ∨ B99)
    PkgRequires(SolvableId, MatchSpecId),
    /// A package's `constrains` dependency forbids installing an incompatible candidate.
    PkgConstrains(SolvableId, SolvableId),
    /// A package's `depends`/conflicts edge forbids installing another solvable alongside it.
    PkgConflicts(SolvableId, SolvableId),
    /// Only one solvable with a given name may be installed at a time.
    PkgSameName(SolvableId, SolvableId),
    /// A package's dependency resolves to zero candidates.
    PkgNothingProvidesDep(SolvableId, MatchSpecId),
    /// A package is flagged as not installable on this platform/variant.
    PkgNotInstallable(SolvableId),
    /// A package conflicts with itself (e.g. a `constrains` entry matches its own name).
    PkgSelfConflict(SolvableId),
    /// Left solvable explicitly obsoletes the right one.
    PkgObsoletes(SolvableId, SolvableId),
    /// Same-name, higher-priority candidate implicitly obsoletes an older one.
    PkgImplicitObsoletes(SolvableId, SolvableId),
    /// An already-installed solvable is obsoleted by a candidate being installed.
    PkgInstalledObsoletes(SolvableId, SolvableId),
    /// A top-level job requires the candidates of a match spec.
    Job(MatchSpecId),
    /// A top-level job's match spec resolves to zero candidates.
    JobNothingProvidesDep(MatchSpecId),
    /// A top-level job names a package that doesn't exist in any loaded repo.
    JobUnknownPackage(NameId),
    /// A top-level job's operation isn't supported by this solver.
    JobUnsupported,
    /// A top-level job is already satisfied by a solvable from the system/base environment.
    JobProvidedBySystem(SolvableId),
    /// Soft preference: prefer updating to the right solvable over keeping the left installed.
    Update(SolvableId, SolvableId),
    /// Soft preference recorded for a `track_features`-bearing candidate.
    Feature(SolvableId),
    /// A multi-candidate disjunction the solver may freely choose among.
    Choice(Vec<SolvableId>),
    /// A clause learnt during conflict analysis.
    Learnt(usize),
    /// Soft preference for the "best" (lexicographically/timestamp-preferred) candidate.
    Best(SolvableId),
    /// Soft de-preference ("blacklist") for a candidate that still remains installable.
    Black(SolvableId),
    /// Soft preference applied during a distribution-upgrade job.
    Distupgrade(SolvableId),
    /// Soft preference for a candidate matching the installed architecture.
    Infarch(SolvableId),
    /// Hard preference: reject a lower-repo-priority candidate when `strict_repo_priority` is set.
    StrictRepoPriority(SolvableId, SolvableId),
    /// Soft preference mirroring yum's `obsoletes` handling for orphaned updates.
    Yumobs(SolvableId, SolvableId),
    /// A top-level job recommendation (soft job-level requires).
    Recommends(SolvableId, MatchSpecId),
    /// A package-level recommendation (soft package requires).
    PkgRecommends(SolvableId, MatchSpecId),
}

impl RuleKind {
    fn initial_watches(
        &self,
        learnt_rules: &[Vec<Literal>],
        pool: &Pool,
    ) -> Option<[SolvableId; 2]> {
        match self {
            RuleKind::InstallRoot
            | RuleKind::JobNothingProvidesDep(_)
            | RuleKind::JobUnknownPackage(_)
            | RuleKind::JobUnsupported
            | RuleKind::JobProvidedBySystem(_)
            | RuleKind::PkgNothingProvidesDep(_, _)
            | RuleKind::PkgNotInstallable(_)
            | RuleKind::PkgSelfConflict(_)
            | RuleKind::Feature(_)
            | RuleKind::Best(_)
            | RuleKind::Black(_)
            | RuleKind::Distupgrade(_)
            | RuleKind::Infarch(_)
            | RuleKind::Choice(_) => None,
            RuleKind::PkgSameName(s1, s2)
            | RuleKind::PkgConflicts(s1, s2)
            | RuleKind::PkgConstrains(s1, s2)
            | RuleKind::PkgObsoletes(s1, s2)
            | RuleKind::PkgImplicitObsoletes(s1, s2)
            | RuleKind::PkgInstalledObsoletes(s1, s2)
            | RuleKind::Update(s1, s2)
            | RuleKind::StrictRepoPriority(s1, s2)
            | RuleKind::Yumobs(s1, s2) => Some([*s1, *s2]),
            RuleKind::Learnt(index) => {
                let literals = &learnt_rules[*index];
                debug_assert!(!literals.is_empty());
                if literals.len() == 1 {
                    None
                } else {
                    Some([
                        literals.first().unwrap().solvable_id,
                        literals.last().unwrap().solvable_id,
                    ])
                }
            }
            RuleKind::PkgRequires(id, match_spec) | RuleKind::PkgRecommends(id, match_spec) => {
                let candidates = pool.match_spec_to_candidates[match_spec.index()]
                    .as_ref()
                    .unwrap();

                if candidates.is_empty() {
                    None
                } else {
                    Some([*id, candidates[0]])
                }
            }
            RuleKind::Job(match_spec) | RuleKind::Recommends(_, match_spec) => {
                let candidates = pool.match_spec_to_candidates[match_spec.index()]
                    .as_ref()
                    .unwrap();
                if candidates.len() < 2 {
                    None
                } else {
                    Some([candidates[0], candidates[1]])
                }
            }
        }
    }

    /// The solvable a problem graph should annotate this rule's source node with, for rule
    /// kinds that don't get their own graph edge type.
    pub(crate) fn offending_solvable(&self) -> Option<SolvableId> {
        match *self {
            RuleKind::InstallRoot
            | RuleKind::Job(_)
            | RuleKind::JobNothingProvidesDep(_)
            | RuleKind::JobUnknownPackage(_)
            | RuleKind::JobUnsupported
            | RuleKind::Choice(_)
            | RuleKind::Learnt(_)
            | RuleKind::PkgRequires(_, _)
            | RuleKind::PkgConstrains(_, _)
            | RuleKind::PkgConflicts(_, _)
            | RuleKind::PkgSameName(_, _) => None,
            RuleKind::PkgNothingProvidesDep(id, _)
            | RuleKind::PkgNotInstallable(id)
            | RuleKind::PkgSelfConflict(id)
            | RuleKind::JobProvidedBySystem(id)
            | RuleKind::Feature(id)
            | RuleKind::Best(id)
            | RuleKind::Black(id)
            | RuleKind::Distupgrade(id)
            | RuleKind::Infarch(id)
            | RuleKind::Recommends(id, _)
            | RuleKind::PkgRecommends(id, _)
            | RuleKind::PkgObsoletes(id, _)
            | RuleKind::PkgImplicitObsoletes(id, _)
            | RuleKind::PkgInstalledObsoletes(id, _)
            | RuleKind::Update(id, _)
            | RuleKind::StrictRepoPriority(id, _)
            | RuleKind::Yumobs(id, _) => Some(id),
        }
    }
}

use crate::id::{MatchSpecId, NameId, RepoId};
use rattler_conda_types::{PackageRecord, Version};
use std::fmt::{Display, Formatter};

pub(crate) struct SolvableDisplay<'a> {
    name: &'a str,
    version: Option<&'a Version>,
    build: Option<&'a str>,
}

impl Display for SolvableDisplay<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)?;
        if let Some(version) = self.version {
            write!(f, " {}", version)?;
        }

        if let Some(build) = self.build {
            if !build.is_empty() {
                write!(f, " {}", build)?;
            }
        }

        Ok(())
    }
}

/// A package-backed solvable: a [`NameId`]-interned name plus a borrowed [`PackageRecord`].
pub struct PackageSolvable<'a> {
    pub(crate) repo_id: RepoId,
    pub(crate) dependencies: Vec<MatchSpecId>,
    pub(crate) constrains: Vec<MatchSpecId>,
    pub record: &'a PackageRecord,
    pub(crate) name: NameId,
    pub metadata: SolvableMetadata,
}

impl PackageSolvable<'_> {
    pub fn repo_id(&self) -> RepoId {
        self.repo_id
    }

    pub fn name(&self) -> NameId {
        self.name
    }

    pub fn dependencies(&self) -> &[MatchSpecId] {
        &self.dependencies
    }

    pub fn constrains(&self) -> &[MatchSpecId] {
        &self.constrains
    }
}

/// Metadata about a solvable that doesn't come from its `PackageRecord`, e.g. its position in
/// the original input list (used to break ties deterministically).
#[derive(Default)]
pub struct SolvableMetadata {
    pub original_index: Option<usize>,
}

pub(crate) struct Solvable<'a> {
    pub(crate) inner: SolvableInner<'a>,
}

pub(crate) enum SolvableInner<'a> {
    Root(Vec<MatchSpecId>),
    Package(PackageSolvable<'a>),
}

impl<'a> Solvable<'a> {
    pub(crate) fn new_root() -> Self {
        Self {
            inner: SolvableInner::Root(Vec::new()),
        }
    }

    pub(crate) fn new_package(repo_id: RepoId, name: NameId, record: &'a PackageRecord) -> Self {
        Self {
            inner: SolvableInner::Package(PackageSolvable {
                repo_id,
                record,
                name,
                dependencies: Vec::new(),
                constrains: Vec::new(),
                metadata: SolvableMetadata::default(),
            }),
        }
    }

    pub(crate) fn display(&self) -> SolvableDisplay {
        match &self.inner {
            SolvableInner::Root(_) => SolvableDisplay {
                name: "root",
                version: None,
                build: None,
            },
            SolvableInner::Package(p) => SolvableDisplay {
                name: p.record.name.as_normalized(),
                version: Some(&p.record.version),
                build: Some(&p.record.build),
            },
        }
    }

    pub(crate) fn root_mut(&mut self) -> &mut Vec<MatchSpecId> {
        match &mut self.inner {
            SolvableInner::Root(match_specs) => match_specs,
            _ => panic!("unexpected package solvable!"),
        }
    }

    pub(crate) fn get_package(&self) -> Option<&PackageSolvable<'a>> {
        match &self.inner {
            SolvableInner::Root(_) => None,
            SolvableInner::Package(p) => Some(p),
        }
    }

    pub(crate) fn get_package_mut(&mut self) -> Option<&mut PackageSolvable<'a>> {
        match &mut self.inner {
            SolvableInner::Root(_) => None,
            SolvableInner::Package(p) => Some(p),
        }
    }

    pub fn package(&self) -> &PackageSolvable<'a> {
        self.get_package().expect("unexpected root solvable")
    }

    pub fn package_mut(&mut self) -> &mut PackageSolvable<'a> {
        self.get_package_mut().expect("unexpected root solvable")
    }
}

//! Reusable entity fixtures.
//!
//! Two record types shaped like the populations a simulation keeps in an
//! [`EntityStore`](cohort_store::EntityStore):
//!
//! - [`Agent`]: a person with an age and a visit counter.
//! - [`Place`]: a location with an open flag and a head count.
//!
//! Plus [`Status`], a fieldless enum used as a mask tag.

/// A person record.
///
/// `id` is the slot index the agent was inserted at, so tests can check
/// that traversal hands each closure the entity it expects.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Agent {
    pub id: usize,
    pub age: u8,
    pub visits: u32,
}

impl Agent {
    pub fn new(id: usize, age: u8) -> Self {
        Self { id, age, visits: 0 }
    }

    /// School-age by the usual 5..=18 cut.
    pub fn is_school_age(&self) -> bool {
        (5..=18).contains(&self.age)
    }
}

/// A location record.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Place {
    pub id: usize,
    pub open: bool,
    pub occupants: u32,
}

/// Mask tags for agent stores.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Status {
    Infectious,
    SchoolAge,
    Vaccinated,
}

impl Status {
    pub const ALL: [Status; 3] = [Status::Infectious, Status::SchoolAge, Status::Vaccinated];
}

/// Labels for agent-store ranges.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Region {
    North,
    South,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn school_age_bounds() {
        assert!(!Agent::new(0, 4).is_school_age());
        assert!(Agent::new(0, 5).is_school_age());
        assert!(Agent::new(0, 18).is_school_age());
        assert!(!Agent::new(0, 19).is_school_age());
    }
}

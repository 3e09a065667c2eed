//! # Manifest Model
//!
//! Canonical jumpers and loads produced by the Burble parser. Both types are
//! value-comparable so a refresh can tell whether anything changed.

use serde::{Deserialize, Serialize};

/// A manifested jumper, optionally leading a group.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Jumper {
    /// Burble jumper id.
    pub id: i64,
    /// Display name.
    pub name: String,
    /// Short jump label ("Video", "Handycam", "Organizer", ...).
    pub short_name: String,
    /// Rig label, empty when unknown.
    pub rig_name: String,
    /// Group name with `-NN` suffixes removed.
    pub group_name: String,
    /// Members led by this jumper. Members never have members of their own.
    pub group_members: Vec<Jumper>,
    /// Instructor or coach attached to a tandem/student leader.
    pub is_instructor: bool,
    /// Tandem student.
    pub is_tandem: bool,
    /// AFF or coach student.
    pub is_student: bool,
    /// Camera flyer.
    pub is_videographer: bool,
    /// Sport jumper organizing a group.
    pub is_organizer: bool,
    /// Also manifested on the previous load.
    pub is_turning: bool,
    /// Jumping into the swoop pond.
    pub is_pond_swoop: bool,
}

impl Jumper {
    /// # New Jumper
    ///
    /// Builds a jumper from raw upstream strings, normalizing them:
    /// - name and label are trimmed
    /// - a leading `jm ` on the name (any case) is dropped
    /// - the label `vs` becomes `Video` and marks a videographer
    /// - a label mentioning the pond marks a pond swoop
    pub fn new(id: i64, name: &str, short_name: &str) -> Self {
        let mut name = name.trim().to_string();
        if name.get(..3).is_some_and(|prefix| prefix.eq_ignore_ascii_case("jm ")) {
            name = name[3..].trim().to_string();
        }

        let mut jumper = Jumper {
            id,
            name,
            short_name: short_name.trim().to_string(),
            ..Default::default()
        };

        let label = jumper.short_name.to_lowercase();
        if label == "vs" {
            jumper.short_name = "Video".to_string();
            jumper.is_videographer = true;
        }
        jumper.is_pond_swoop = label.contains("pond");
        jumper
    }

    /// Appends `member` to this jumper's group.
    ///
    /// A member attached to a tandem or student leader is that leader's
    /// instructor unless they are flying camera.
    pub fn add_group_member(&mut self, mut member: Jumper) {
        member.is_instructor = (self.is_tandem || self.is_student) && !member.is_videographer;
        self.group_members.push(member);
    }

    /// Visits this jumper and every group member.
    pub fn for_each(&self, f: &mut impl FnMut(&Jumper)) {
        f(self);
        for member in &self.group_members {
            member.for_each(f);
        }
    }

    /// Mutable counterpart of [`Jumper::for_each`].
    pub fn for_each_mut(&mut self, f: &mut impl FnMut(&mut Jumper)) {
        f(self);
        for member in &mut self.group_members {
            member.for_each_mut(f);
        }
    }
}

/// Sorts jumpers by case-insensitive name, keeping upstream order for ties.
pub fn sort_by_name(jumpers: &mut [Jumper]) {
    jumpers.sort_by_cached_key(|j| j.name.to_lowercase());
}

/// One aircraft load as shown on the manifest boards.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Load {
    /// Burble load id.
    pub id: i64,
    /// Aircraft name.
    pub aircraft_name: String,
    /// Load number within the day.
    pub load_number: String,
    /// Minutes until call. May be negative once the load has been called.
    pub call_minutes: i64,
    /// No call time has been set (upstream reports 120 or more minutes).
    pub is_no_time: bool,
    /// The aircraft is fueling.
    pub is_fueling: bool,
    /// The aircraft is turning from the previous load.
    pub is_turning: bool,
    /// Open slots, never negative.
    pub slots_available: i64,
    /// Tandem students, each leading their instructor and camera.
    pub tandems: Vec<Jumper>,
    /// Students, each leading their instructors.
    pub students: Vec<Jumper>,
    /// Sport jumpers and organized groups.
    pub sport_jumpers: Vec<Jumper>,
}

impl Load {
    /// Visits every jumper on the load, group members included.
    pub fn for_each_jumper(&self, f: &mut impl FnMut(&Jumper)) {
        for j in self.tandems.iter().chain(&self.students).chain(&self.sport_jumpers) {
            j.for_each(f);
        }
    }

    /// Mutable counterpart of [`Load::for_each_jumper`].
    pub fn for_each_jumper_mut(&mut self, f: &mut impl FnMut(&mut Jumper)) {
        for j in self
            .tandems
            .iter_mut()
            .chain(self.students.iter_mut())
            .chain(self.sport_jumpers.iter_mut())
        {
            j.for_each_mut(f);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_and_labels_are_normalized() {
        let j = Jumper::new(1, "  JM Alice Smith ", " vs ");
        assert_eq!(j.name, "Alice Smith");
        assert_eq!(j.short_name, "Video");
        assert!(j.is_videographer);

        let j = Jumper::new(2, "Jimmy", "Pond Swoop");
        assert_eq!(j.name, "Jimmy");
        assert!(j.is_pond_swoop);
    }

    #[test]
    fn instructors_follow_the_leader_kind() {
        let mut tandem = Jumper::new(1, "Student", "Tandem");
        tandem.is_tandem = true;
        tandem.add_group_member(Jumper::new(2, "TI", "TI"));
        tandem.add_group_member(Jumper::new(3, "Camera", "vs"));
        assert!(tandem.group_members[0].is_instructor);
        assert!(!tandem.group_members[1].is_instructor);

        let mut fun = Jumper::new(4, "Org", "Organizer");
        fun.add_group_member(Jumper::new(5, "Friend", "4 way"));
        assert!(!fun.group_members[0].is_instructor);
    }

    #[test]
    fn sort_ignores_case() {
        let mut list = vec![Jumper::new(1, "bob", ""), Jumper::new(2, "Alice", ""), Jumper::new(3, "carl", "")];
        sort_by_name(&mut list);
        let names: Vec<_> = list.iter().map(|j| j.name.as_str()).collect();
        assert_eq!(names, ["Alice", "bob", "carl"]);
    }
}

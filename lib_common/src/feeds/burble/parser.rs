//! # Burble Manifest Parser
//!
//! Turns the raw `getLoads` JSON into canonical [`Load`]s. Burble's payload
//! is loosely typed (ids arrive as ints or strings, flags as bools, ints or
//! strings) so every scalar goes through `utils::decode`.
//!
//! ## Pipeline:
//! 1. Drop loads explicitly marked non-public.
//! 2. Split each load into tandems, students and sport jumpers from its groups,
//!    tallying public and private slots along the way.
//! 3. Cluster sport jumpers that share a group name behind their organizer.
//! 4. Sort every list by name and compute open slots.
//! 5. Mark jumpers who were also on the previous load as turning.
//! 6. Keep the displayable loads.
//!
//! Burble is asked for one more column than is displayed; that lookahead
//! load only takes part in turning detection.

use serde_json::{Map, Value};

use super::model::{sort_by_name, Jumper, Load};
use crate::configs::Settings;
use crate::feeds::FeedError;
use crate::utils::decode::{bool_value, int_value, str_value};

/// Call minutes at or above which Burble means "no time set".
const NO_TIME_MINUTES: i64 = 120;

/// Parameters for one parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestParser {
    organizer_tokens: Vec<String>,
    display_columns: usize,
    min_call_minutes: i64,
}

impl ManifestParser {
    /// Creates a parser. Organizer tokens are compared case-insensitively.
    pub fn new(organizer_tokens: Vec<String>, display_columns: usize, min_call_minutes: i64) -> Self {
        Self {
            organizer_tokens: organizer_tokens.into_iter().map(|t| t.to_lowercase()).collect(),
            display_columns,
            min_call_minutes,
        }
    }

    /// Snapshots the parse parameters from the current settings.
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            settings.organizer_strings(),
            settings.display_columns(),
            settings.min_call_minutes(),
        )
    }

    /// Number of columns the displayed loads occupy.
    pub fn display_columns(&self) -> usize {
        self.display_columns
    }

    /// Number of columns to ask Burble for: one extra for turning detection.
    pub fn requested_columns(&self) -> usize {
        self.display_columns + 1
    }

    /// # Parse
    ///
    /// Runs the whole pipeline over a raw payload.
    ///
    /// # Errors
    /// - the payload is not an object, or has no `loads` array
    /// - a load is missing its `name` or its `groups` array
    ///
    /// Malformed groups and members are skipped without failing the parse.
    pub fn parse(&self, raw: &Value) -> Result<Vec<Load>, FeedError> {
        let mut loads = self.parse_loads(raw)?;
        mark_turning(&mut loads);
        Ok(select_loads(loads, self.min_call_minutes, self.display_columns))
    }

    /// Parses every public load in upstream order, without turning
    /// detection or filtering.
    pub fn parse_loads(&self, raw: &Value) -> Result<Vec<Load>, FeedError> {
        let top = raw
            .as_object()
            .ok_or_else(|| FeedError::InvalidData("manifest payload is not an object".to_string()))?;
        let loads = top
            .get("loads")
            .and_then(Value::as_array)
            .ok_or_else(|| FeedError::InvalidData("manifest payload is missing load information".to_string()))?;

        let mut parsed = Vec::with_capacity(loads.len());
        for raw_load in loads {
            let Some(load) = raw_load.as_object() else {
                log::debug!("skipping non-object load: {}", raw_load);
                continue;
            };

            // Only honored when present; the current format omits it.
            if let Some(flag) = load.get("is_public") {
                if !bool_value("is_public", Some(flag)) {
                    continue;
                }
            }

            parsed.push(self.parse_load(load)?);
        }
        Ok(parsed)
    }

    fn parse_load(&self, load: &Map<String, Value>) -> Result<Load, FeedError> {
        let name = str_value(load, "name")
            .ok_or_else(|| FeedError::InvalidData("load is missing its name".to_string()))?;
        let groups = load
            .get("groups")
            .and_then(Value::as_array)
            .ok_or_else(|| FeedError::InvalidData(format!("load '{}' has no groups array", name)))?;

        let mut l = Load {
            id: int_value("id", load.get("id")),
            aircraft_name: str_value(load, "aircraft_name").unwrap_or_default().to_string(),
            is_fueling: bool_value("is_fueling", load.get("is_fueling")),
            is_turning: bool_value("is_turning", load.get("is_turning")),
            call_minutes: int_value("time_left", load.get("time_left")),
            ..Default::default()
        };
        l.is_no_time = l.call_minutes >= NO_TIME_MINUTES;

        // aircraft_name is blank in the current format; the combined name
        // is "<aircraft> <load number>".
        if l.aircraft_name.is_empty() {
            if let Some(x) = name.rfind(' ') {
                l.aircraft_name = name[..x].to_string();
            }
        }
        l.load_number = if l.aircraft_name.is_empty() {
            name.trim().to_string()
        } else {
            name.strip_prefix(l.aircraft_name.as_str())
                .unwrap_or(name)
                .trim()
                .to_string()
        };

        let max_slots = int_value("max_slots", load.get("max_slots"));
        let mut reserve_slots = int_value("reserve_slots", load.get("reserve_slots"));
        let (mut public_slots, mut private_slots) = (0i64, 0i64);

        for raw_group in groups {
            let Some(members) = raw_group.as_array() else {
                log::debug!("skipping malformed group on load '{}'", name);
                continue;
            };
            let Some(first) = members.first().and_then(Value::as_object) else {
                continue;
            };

            for member in members.iter().filter_map(Value::as_object) {
                if bool_value("is_public", member.get("is_public")) {
                    public_slots += 1;
                } else if bool_value("is_private", member.get("is_private")) {
                    private_slots += 1;
                }
            }

            let Some(mut primary) = jumper_from_json(first) else {
                log::debug!("skipping group with malformed primary on load '{}'", name);
                continue;
            };
            let label = primary.short_name.to_lowercase();
            primary.is_organizer = self.organizer_tokens.iter().any(|t| *t == label);

            let kind = str_value(first, "type").unwrap_or_default();
            match kind {
                "Student" => primary.is_student = true,
                "Tandem" => primary.is_tandem = true,
                _ => {}
            }
            for member in members.iter().skip(1).filter_map(Value::as_object) {
                if let Some(jumper) = jumper_from_json(member) {
                    primary.add_group_member(jumper);
                }
            }

            match kind {
                "Sport Jumper" => l.sport_jumpers.push(primary),
                "Student" => l.students.push(primary),
                "Tandem" => l.tandems.push(primary),
                other => log::debug!("unlisted jumper type '{}' on load '{}'", other, name),
            }
        }

        l.sport_jumpers = cluster_by_organizer(std::mem::take(&mut l.sport_jumpers));

        sort_by_name(&mut l.tandems);
        sort_by_name(&mut l.students);
        sort_by_name(&mut l.sport_jumpers);

        // Private slots are manifested reserve slots.
        reserve_slots = (reserve_slots - private_slots).max(0);
        l.slots_available = (max_slots - public_slots - private_slots - reserve_slots).max(0);

        Ok(l)
    }
}

/// Strips trailing `-NN` suffixes, repeatedly: `"Smith-01-2"` becomes `"Smith"`.
pub fn parse_group_name(s: &str) -> &str {
    let mut s = s;
    while let Some(x) = s.rfind('-') {
        if !s[x + 1..].chars().all(|c| c.is_ascii_digit()) {
            break;
        }
        s = &s[..x];
    }
    s
}

/// Builds a jumper from one group member record. `None` when the record has no name.
fn jumper_from_json(member: &Map<String, Value>) -> Option<Jumper> {
    let name = str_value(member, "name")?;
    let id = int_value("id", member.get("id"));
    let mut label = str_value(member, "jump").unwrap_or_default();
    if str_value(member, "handycam_jump").is_some_and(|s| !s.is_empty()) {
        label = "Handycam";
    }

    let mut jumper = Jumper::new(id, name, label);
    if let Some(group) = str_value(member, "group_number") {
        jumper.group_name = parse_group_name(group).to_string();
    }

    // rig_name is current; rig_id carried the label in an older format and
    // reports "0" when unset.
    match str_value(member, "rig_name") {
        Some(rig) if !rig.is_empty() => jumper.rig_name = rig.to_string(),
        _ => {
            if let Some(rig) = str_value(member, "rig_id").filter(|r| !r.is_empty() && *r != "0") {
                jumper.rig_name = rig.to_string();
            }
        }
    }
    Some(jumper)
}

/// # Cluster By Organizer
///
/// Groups sport jumpers by group name (falling back to their own name).
/// A cluster containing an organizer collapses into that organizer with the
/// rest as sorted members; any other cluster stays as independent jumpers.
fn cluster_by_organizer(jumpers: Vec<Jumper>) -> Vec<Jumper> {
    let mut clusters: Vec<(String, Vec<Jumper>)> = Vec::new();
    for j in jumpers {
        let key = if j.group_name.is_empty() {
            j.name.clone()
        } else {
            j.group_name.clone()
        };
        match clusters.iter_mut().find(|(k, _)| *k == key) {
            Some((_, members)) => members.push(j),
            None => clusters.push((key, vec![j])),
        }
    }

    let mut out = Vec::new();
    for (_, mut members) in clusters {
        match members.iter().position(|m| m.is_organizer) {
            Some(pos) => {
                let mut organizer = members.remove(pos);
                for m in members {
                    organizer.add_group_member(m);
                }
                sort_by_name(&mut organizer.group_members);
                out.push(organizer);
            }
            None => out.extend(members),
        }
    }
    out
}

/// Marks every jumper on load N+1 whose name also appears on load N.
///
/// Burble does not expose stable jumper ids across loads, so the match is
/// by name only and two different people sharing a name both match.
pub fn mark_turning(loads: &mut [Load]) {
    for i in 1..loads.len() {
        let mut names = std::collections::HashSet::new();
        loads[i - 1].for_each_jumper(&mut |j| {
            names.insert(j.name.clone());
        });
        loads[i].for_each_jumper_mut(&mut |j| {
            if names.contains(&j.name) {
                j.is_turning = true;
            }
        });
    }
}

/// Keeps loads whose call minutes reach `min_call_minutes`, in order, up to `columns`.
pub fn select_loads(loads: Vec<Load>, min_call_minutes: i64, columns: usize) -> Vec<Load> {
    loads
        .into_iter()
        .filter(|l| l.call_minutes >= min_call_minutes)
        .take(columns)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn member(name: &str, kind: &str, jump: &str, group: &str) -> Value {
        json!({
            "name": name, "id": "7", "type": kind, "jump": jump,
            "group_number": group, "is_public": 1, "rig_name": ""
        })
    }

    fn load(name: &str, time_left: Value, groups: Value) -> Value {
        json!({
            "id": 1, "name": name, "aircraft_name": "", "time_left": time_left,
            "max_slots": 22, "reserve_slots": 0, "is_fueling": false,
            "is_turning": "0", "groups": groups
        })
    }

    fn parser(columns: usize) -> ManifestParser {
        ManifestParser::new(vec!["organizer".to_string()], columns, 0)
    }

    #[test]
    fn group_name_suffixes_are_stripped_repeatedly() {
        assert_eq!(parse_group_name("Smith-01"), "Smith");
        assert_eq!(parse_group_name("Smith-01-2"), "Smith");
        assert_eq!(parse_group_name("Big-Way"), "Big-Way");
        assert_eq!(parse_group_name("Solo"), "Solo");
    }

    #[test]
    fn aircraft_and_load_number_split_at_last_space() {
        let raw = json!({ "loads": [ load("Super Otter 12", json!(20), json!([])) ] });
        let loads = parser(5).parse(&raw).unwrap();
        assert_eq!(loads[0].aircraft_name, "Super Otter");
        assert_eq!(loads[0].load_number, "12");
        assert!(!loads[0].is_no_time);
    }

    #[test]
    fn long_call_times_mean_no_time() {
        let raw = json!({ "loads": [ load("Otter 1", json!("120"), json!([])) ] });
        assert!(parser(5).parse(&raw).unwrap()[0].is_no_time);
    }

    #[test]
    fn non_public_loads_and_non_objects_are_skipped() {
        let mut hidden = load("Otter 2", json!(10), json!([]));
        hidden["is_public"] = json!("false");
        let raw = json!({ "loads": [ 5, hidden, load("Otter 3", json!(10), json!([])) ] });
        let loads = parser(5).parse(&raw).unwrap();
        assert_eq!(loads.len(), 1);
        assert_eq!(loads[0].load_number, "3");
    }

    #[test]
    fn payload_shape_errors_fail_the_parse() {
        assert!(parser(5).parse(&json!([])).is_err());
        assert!(parser(5).parse(&json!({ "loads": {} })).is_err());
        assert!(parser(5).parse(&json!({ "loads": [ { "groups": [] } ] })).is_err());
        assert!(parser(5).parse(&json!({ "loads": [ { "name": "Otter 1" } ] })).is_err());
    }

    #[test]
    fn groups_split_into_tandems_students_and_sport() {
        let groups = json!([
            [ member("Tess", "Tandem", "Tandem", ""), member("Ian", "Sport Jumper", "TI", ""), member("Vic", "Sport Jumper", "vs", "") ],
            [ member("Stu", "Student", "AFF 3", ""), member("Ann", "Sport Jumper", "AFFI", "") ],
            [ member("zed", "Sport Jumper", "Solo", "") ],
            [ member("Amy", "Sport Jumper", "Solo", "") ],
            [ member("Pat", "Pilot", "", "") ],
            "not a group",
            [ { "id": 3 } ]
        ]);
        let raw = json!({ "loads": [ load("Otter 4", json!(15), groups) ] });
        let l = &parser(5).parse(&raw).unwrap()[0];

        assert_eq!(l.tandems.len(), 1);
        assert!(l.tandems[0].is_tandem);
        assert!(l.tandems[0].group_members[0].is_instructor);
        assert!(l.tandems[0].group_members[1].is_videographer);
        assert!(!l.tandems[0].group_members[1].is_instructor);

        assert!(l.students[0].is_student);
        assert!(l.students[0].group_members[0].is_instructor);

        let sport: Vec<_> = l.sport_jumpers.iter().map(|j| j.name.as_str()).collect();
        assert_eq!(sport, ["Amy", "zed"]);
    }

    #[test]
    fn rig_and_handycam_fallbacks() {
        let groups = json!([[{
            "name": "Cam", "id": 9, "type": "Sport Jumper", "jump": "Fun",
            "handycam_jump": "yes", "rig_name": "", "rig_id": "Javelin"
        }], [{
            "name": "Zero", "id": 10, "type": "Sport Jumper", "jump": "Fun", "rig_id": "0"
        }]]);
        let raw = json!({ "loads": [ load("Otter 5", json!(15), groups) ] });
        let l = &parser(5).parse(&raw).unwrap()[0];
        assert_eq!(l.sport_jumpers[0].short_name, "Handycam");
        assert_eq!(l.sport_jumpers[0].rig_name, "Javelin");
        assert_eq!(l.sport_jumpers[1].rig_name, "");
    }

    #[test]
    fn min_call_minutes_filter_preserves_order() {
        let raw = json!({ "loads": [
            load("Otter 1", json!(-3), json!([])),
            load("Otter 2", json!(5), json!([])),
            load("Otter 3", json!(25), json!([])),
            load("Otter 4", json!(45), json!([])),
        ] });
        let loads = ManifestParser::new(vec![], 2, 0).parse(&raw).unwrap();
        let numbers: Vec<_> = loads.iter().map(|l| l.load_number.as_str()).collect();
        assert_eq!(numbers, ["2", "3"]);
    }
}

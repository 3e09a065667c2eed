//! # Manifest Update
//!
//! The composite update streamed to clients and the diff that keeps it small.
//!
//! An update has one section per area of the boards. Each section is a
//! [`Section`]: `Unchanged` sections are left out of the JSON entirely, so a
//! client applies whatever is present and keeps the rest. The first update a
//! client receives carries every section.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashSet;

use super::flags::SourceChangeFlags;
use super::state::{DropzoneState, WHITE};
use crate::feeds::burble::{Jumper, Load};
use crate::feeds::winds::WindsAloftSample;
use crate::jumprun::Turn;

const YELLOW: u32 = 0xffff00;
const GREEN: u32 = 0x00ff00;
const CYAN: u32 = 0x00ffff;
const MAGENTA: u32 = 0xff00ff;

const POND_SWOOP_MARK: &str = "\u{1F3C4}";
const TURNING_MARK: &str = "\u{267B}\u{FE0F} ";

/// # Section
///
/// One part of an update: either left as the client has it, or replaced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Section<T> {
    /// Keep the previous value.
    Unchanged,
    /// Replace with this value.
    Changed(T),
}

impl<T> Default for Section<T> {
    fn default() -> Self {
        Section::Unchanged
    }
}

impl<T> Section<T> {
    /// `true` for [`Section::Unchanged`].
    pub fn is_unchanged(&self) -> bool {
        matches!(self, Section::Unchanged)
    }

    /// The new value, if any.
    pub fn as_changed(&self) -> Option<&T> {
        match self {
            Section::Changed(v) => Some(v),
            Section::Unchanged => None,
        }
    }
}

impl<T: Serialize> Serialize for Section<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Section::Changed(v) => serializer.serialize_some(v),
            Section::Unchanged => serializer.serialize_none(),
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Section<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match Option::<T>::deserialize(deserializer)? {
            Some(v) => Section::Changed(v),
            None => Section::Unchanged,
        })
    }
}

/// Weather and jump separation strings.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    /// Surface wind conditions.
    pub winds: String,
    /// Color of `winds`.
    pub winds_color: u32,
    /// Sky cover.
    pub clouds: String,
    /// Color of `clouds`.
    pub clouds_color: u32,
    /// Present weather.
    pub weather: String,
    /// Color of `weather`.
    pub weather_color: u32,
    /// Exit separation at altitude.
    pub separation: String,
    /// Color of `separation`; red when winds reach jump run airspeed.
    pub separation_color: u32,
    /// Surface temperature.
    pub temperature: String,
    /// Color of `temperature`.
    pub temperature_color: u32,
}

/// Runtime display options plus the sunrise/sunset countdowns.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionsSection {
    /// Show nicknames.
    pub display_nicknames: bool,
    /// Show the weather panel.
    pub display_weather: bool,
    /// Show the winds aloft panel.
    pub display_winds: bool,
    /// Operator message.
    pub message: String,
    /// Color of `message`.
    pub message_color: u32,
    /// Fuel truck requested.
    pub fuel_requested: bool,
    /// Sunrise countdown, empty outside the final hour.
    pub sunrise: String,
    /// Sunset countdown, empty outside the final hour.
    pub sunset: String,
}

/// Where the jump run is drawn from.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JumprunOrigin {
    /// Decimal degrees.
    pub latitude: String,
    /// Decimal degrees.
    pub longitude: String,
    /// Degrees to add to true headings.
    pub magnetic_deviation: i32,
    /// Camera height in feet.
    pub camera_height: i32,
}

/// The flown path, present only while a run is set.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JumprunPath {
    /// Degrees magnetic.
    pub heading: i32,
    /// Tenths of a mile.
    pub exit_distance: i32,
    /// Degrees magnetic.
    pub offset_heading: i32,
    /// Tenths of a mile.
    pub offset_distance: i32,
    /// Hook turns in order.
    pub turns: Vec<Turn>,
}

/// The jump run section.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JumprunSection {
    /// Origin, always present.
    pub origin: JumprunOrigin,
    /// Path, absent when no run is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<JumprunPath>,
    /// Parallel run offsets.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub offsets: Vec<i32>,
}

/// The winds aloft section.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindsAloftSection {
    /// Samples from the ground up.
    pub samples: Vec<WindsAloftSample>,
}

/// How a jumper appears on a board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JumperType {
    /// Licensed sport jumper.
    #[default]
    Experienced,
    /// Camera flyer.
    Videographer,
    /// Tandem student.
    TandemStudent,
    /// Tandem instructor.
    TandemInstructor,
    /// AFF student.
    AffStudent,
    /// AFF instructor.
    AffInstructor,
    /// Coach student.
    CoachStudent,
    /// Coach.
    Coach,
}

/// A jumper as shown on a board.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotJumper {
    /// Burble jumper id.
    pub id: i64,
    /// Board role.
    #[serde(rename = "type")]
    pub jumper_type: JumperType,
    /// Display name.
    pub name: String,
    /// Short jump label.
    pub short_name: String,
    /// RGB color.
    pub color: u32,
    /// Fully formatted line.
    pub repr: String,
    /// Rig label.
    pub rig_name: String,
}

/// A group leader and the members shown beneath them.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JumperGroup {
    /// Group leader.
    pub leader: SlotJumper,
    /// Members in display order.
    pub members: Vec<SlotJumper>,
}

/// One line (or block of lines) on a load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LoadSlot {
    /// A lone jumper.
    Jumper(SlotJumper),
    /// A leader with members.
    Group(JumperGroup),
}

/// A load as shown on a board.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadEntry {
    /// Burble load id.
    pub id: i64,
    /// Aircraft name.
    pub aircraft_name: String,
    /// Load number.
    pub load_number: String,
    /// Minutes until call.
    pub call_minutes: i64,
    /// `"NOW"` at zero, empty with no call time, otherwise the minutes.
    pub call_minutes_string: String,
    /// Open slots.
    pub slots_available: i64,
    /// `"N aboard"` close to call, otherwise `"1 slot"` or `"N slots"`.
    pub slots_available_string: String,
    /// Aircraft is fueling.
    pub is_fueling: bool,
    /// Aircraft is turning.
    pub is_turning: bool,
    /// No call time set.
    pub is_no_time: bool,
    /// Tandems, then students, then sport jumpers.
    pub slots: Vec<LoadSlot>,
}

/// The loads section.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadsSection {
    /// Columns the boards should lay out.
    pub column_count: usize,
    /// Loads in display order.
    pub loads: Vec<LoadEntry>,
}

/// # Manifest Update
///
/// The message streamed to clients.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestUpdate {
    /// Weather and separation.
    #[serde(default, skip_serializing_if = "Section::is_unchanged")]
    pub status: Section<Status>,
    /// Display options and countdowns.
    #[serde(default, skip_serializing_if = "Section::is_unchanged")]
    pub options: Section<OptionsSection>,
    /// Jump run.
    #[serde(default, skip_serializing_if = "Section::is_unchanged")]
    pub jumprun: Section<JumprunSection>,
    /// Winds aloft.
    #[serde(default, skip_serializing_if = "Section::is_unchanged")]
    pub winds_aloft: Section<WindsAloftSection>,
    /// Loads.
    #[serde(default, skip_serializing_if = "Section::is_unchanged")]
    pub loads: Section<LoadsSection>,
}

impl ManifestUpdate {
    /// # Construct
    ///
    /// Builds the sections implicated by `flags` from the current state:
    ///
    /// | Section    | Recomputed on                                      |
    /// |------------|----------------------------------------------------|
    /// | options    | OPTIONS, PRE_SUNRISE, SUNRISE, PRE_SUNSET, SUNSET |
    /// | status     | METAR, WINDS_ALOFT                                 |
    /// | jumprun    | JUMPRUN                                            |
    /// | windsAloft | WINDS_ALOFT                                        |
    /// | loads      | BURBLE, OPTIONS                                    |
    ///
    /// The sunrise text is only recomputed on sunrise flags and the sunset
    /// text on sunset flags; otherwise they are carried over from `previous`.
    /// Sections of disabled sources stay unchanged.
    pub fn construct(state: &DropzoneState, flags: SourceChangeFlags, previous: &ManifestUpdate) -> Self {
        let mut update = ManifestUpdate::default();

        let options_flags =
            SourceChangeFlags::OPTIONS | SourceChangeFlags::SUNRISE_EDGES | SourceChangeFlags::SUNSET_EDGES;
        if flags.intersects(options_flags) {
            let o = state.settings().options();
            let carried = previous.options.as_changed();
            let now = state.current_time();
            update.options = Section::Changed(OptionsSection {
                display_nicknames: o.display_nicknames,
                display_weather: o.display_weather,
                display_winds: o.display_winds,
                message: o.message,
                message_color: WHITE,
                fuel_requested: o.fuel_requested,
                sunrise: if flags.intersects(SourceChangeFlags::SUNRISE_EDGES) {
                    state.sunrise_message_at(now)
                } else {
                    carried.map(|c| c.sunrise.clone()).unwrap_or_default()
                },
                sunset: if flags.intersects(SourceChangeFlags::SUNSET_EDGES) {
                    state.sunset_message_at(now)
                } else {
                    carried.map(|c| c.sunset.clone()).unwrap_or_default()
                },
            });
        }

        if flags.intersects(SourceChangeFlags::METAR | SourceChangeFlags::WINDS_ALOFT) {
            let (separation_color, separation) = state.separation_strings();
            let mut status = Status {
                winds_color: WHITE,
                clouds_color: WHITE,
                weather_color: WHITE,
                separation,
                separation_color,
                temperature_color: WHITE,
                ..Default::default()
            };
            if let Some(metar) = state.metar() {
                status.winds = metar.wind_conditions();
                status.clouds = metar.sky_cover();
                status.weather = metar.weather_conditions();
                status.temperature = metar.temperature_string();
            }
            update.status = Section::Changed(status);
        }

        if flags.contains(SourceChangeFlags::JUMPRUN) {
            if let Some(controller) = state.jumprun() {
                let j = controller.jumprun();
                update.jumprun = Section::Changed(JumprunSection {
                    origin: JumprunOrigin {
                        latitude: j.latitude.clone(),
                        longitude: j.longitude.clone(),
                        magnetic_deviation: j.magnetic_declination,
                        camera_height: j.camera_height,
                    },
                    path: j.is_set.then(|| JumprunPath {
                        heading: j.heading,
                        exit_distance: j.exit_distance,
                        offset_heading: j.offset_heading,
                        offset_distance: j.offset_distance,
                        turns: j.turns().copied().collect(),
                    }),
                    offsets: if j.is_set { j.parallel_offsets().collect() } else { Vec::new() },
                });
            }
        }

        if flags.contains(SourceChangeFlags::WINDS_ALOFT) {
            if let Some(winds) = state.winds() {
                update.winds_aloft = Section::Changed(WindsAloftSection {
                    samples: winds.samples(),
                });
            }
        }

        if flags.intersects(SourceChangeFlags::BURBLE | SourceChangeFlags::OPTIONS) {
            let burble = state.burble();
            update.loads = Section::Changed(LoadsSection {
                column_count: burble.column_count(),
                loads: burble.loads().iter().map(load_entry).collect(),
            });
        }

        update
    }

    /// # Diff
    ///
    /// Marks every section equal to the one in `baseline` as unchanged.
    ///
    /// # Returns
    /// `true` when any section is still changed.
    pub fn diff(&mut self, baseline: &ManifestUpdate) -> bool {
        fn prune<T: PartialEq>(section: &mut Section<T>, baseline: &Section<T>) {
            if *section == *baseline {
                *section = Section::Unchanged;
            }
        }
        prune(&mut self.status, &baseline.status);
        prune(&mut self.options, &baseline.options);
        prune(&mut self.jumprun, &baseline.jumprun);
        prune(&mut self.winds_aloft, &baseline.winds_aloft);
        prune(&mut self.loads, &baseline.loads);
        !self.is_empty()
    }

    /// Copies every changed section into `baseline`.
    pub fn merge_into(&self, baseline: &mut ManifestUpdate) {
        fn merge<T: Clone>(section: &Section<T>, baseline: &mut Section<T>) {
            if let Section::Changed(v) = section {
                *baseline = Section::Changed(v.clone());
            }
        }
        merge(&self.status, &mut baseline.status);
        merge(&self.options, &mut baseline.options);
        merge(&self.jumprun, &mut baseline.jumprun);
        merge(&self.winds_aloft, &mut baseline.winds_aloft);
        merge(&self.loads, &mut baseline.loads);
    }

    /// `true` when every section is unchanged.
    pub fn is_empty(&self) -> bool {
        self.status.is_unchanged()
            && self.options.is_unchanged()
            && self.jumprun.is_unchanged()
            && self.winds_aloft.is_unchanged()
            && self.loads.is_unchanged()
    }
}

/// # Load Entry
///
/// Formats one load for the boards.
pub fn load_entry(load: &Load) -> LoadEntry {
    let call_minutes_string = match (load.is_no_time, load.call_minutes) {
        (true, _) => String::new(),
        (false, 0) => "NOW".to_string(),
        (false, n) => n.to_string(),
    };

    let slots: Vec<LoadSlot> = load
        .tandems
        .iter()
        .chain(&load.students)
        .chain(&load.sport_jumpers)
        .map(|j| slot_from_jumper(j, load))
        .collect();

    // Burble does not expose unique jumper ids on loads, so count names.
    let slots_available_string = if load.call_minutes <= 5 {
        let mut names = HashSet::new();
        for slot in &slots {
            match slot {
                LoadSlot::Jumper(j) => {
                    names.insert(j.name.as_str());
                }
                LoadSlot::Group(g) => {
                    names.insert(g.leader.name.as_str());
                    names.extend(g.members.iter().map(|m| m.name.as_str()));
                }
            }
        }
        format!("{} aboard", names.len())
    } else if load.slots_available == 1 {
        "1 slot".to_string()
    } else {
        format!("{} slots", load.slots_available)
    };

    LoadEntry {
        id: load.id,
        aircraft_name: load.aircraft_name.clone(),
        load_number: load.load_number.clone(),
        call_minutes: load.call_minutes,
        call_minutes_string,
        slots_available: load.slots_available,
        slots_available_string,
        is_fueling: load.is_fueling,
        is_turning: load.is_turning,
        is_no_time: load.is_no_time,
        slots,
    }
}

fn slot_from_jumper(j: &Jumper, load: &Load) -> LoadSlot {
    let leader = translate_jumper(j, None, load);
    if j.group_members.is_empty() {
        return LoadSlot::Jumper(leader);
    }
    let members = j
        .group_members
        .iter()
        .map(|m| translate_jumper(m, Some(&leader), load))
        .collect();
    LoadSlot::Group(JumperGroup { leader, members })
}

/// # Translate Jumper
///
/// Picks the board color, role and display line for a jumper. Members take
/// their leader's color when they are instructing or flying camera.
pub fn translate_jumper(j: &Jumper, leader: Option<&SlotJumper>, load: &Load) -> SlotJumper {
    let mut short_name = j.short_name.clone();
    let mut prefix = "";

    let color = match leader {
        Some(l) if j.is_instructor || j.is_videographer => l.color,
        _ if j.is_tandem => {
            if leader.is_none() {
                prefix = "Tandem";
                short_name.clear();
            }
            YELLOW
        }
        _ if j.is_student || j.short_name.ends_with(" + Gear") => {
            if j.short_name.ends_with(" H/P") {
                prefix = "H&P";
            }
            GREEN
        }
        _ if j.short_name.starts_with("3-5k") || j.short_name.starts_with("3.5k") => {
            prefix = "H&P";
            if j.is_pond_swoop {
                CYAN
            } else {
                MAGENTA
            }
        }
        _ if j.is_pond_swoop => CYAN,
        _ => WHITE,
    };

    if !j.rig_name.is_empty() {
        short_name = format!("{} / {}", j.rig_name, short_name);
    }
    if !short_name.is_empty() {
        short_name = format!(" ({})", short_name);
    }
    let mut repr = if prefix.is_empty() {
        format!("{}{}", j.name, short_name)
    } else {
        format!("{}: {}{}", prefix, j.name, short_name)
    };
    if j.is_pond_swoop {
        repr.insert_str(0, POND_SWOOP_MARK);
    }
    if j.is_turning && load.is_turning {
        repr.insert_str(0, TURNING_MARK);
    }
    if leader.is_some() {
        repr.insert(0, '\t');
    }

    let jumper_type = if j.is_videographer {
        JumperType::Videographer
    } else if let Some(l) = leader {
        match (l.jumper_type, j.is_instructor) {
            (JumperType::TandemStudent, true) => JumperType::TandemInstructor,
            (JumperType::AffStudent, true) => JumperType::AffInstructor,
            (JumperType::CoachStudent, true) => JumperType::Coach,
            _ => JumperType::Experienced,
        }
    } else if j.is_tandem {
        JumperType::TandemStudent
    } else if j.is_student {
        JumperType::AffStudent
    } else {
        JumperType::Experienced
    };

    SlotJumper {
        id: j.id,
        jumper_type,
        name: j.name.clone(),
        short_name: j.short_name.clone(),
        color,
        repr,
        rig_name: j.rig_name.clone(),
    }
}

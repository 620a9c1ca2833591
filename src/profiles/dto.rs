use serde::Deserialize;

use super::repo::ProfileData;

pub const DND_CLASSES: &[&str] = &[
    "Barbarian", "Bard", "Cleric", "Druid", "Fighter", "Monk", "Paladin", "Ranger", "Rogue",
    "Sorcerer", "Warlock", "Wizard",
];

pub const DND_RACES: &[&str] = &[
    "Dragonborn", "Dwarf", "Elf", "Gnome", "Half-Elf", "Half-Orc", "Halfling", "Human", "Tiefling",
];

pub const EXPERIENCE_LEVELS: &[&str] = &["beginner", "casual", "veteran", "forever-dm"];

pub const TIMEZONES: &[&str] = &[
    "UTC-8", "UTC-5", "UTC-3", "UTC", "UTC+1", "UTC+3", "UTC+5:30", "UTC+8", "UTC+10",
];

/// Raw profile form fields, shared by the urlencoded and multipart paths.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct ProfileFields {
    pub name: Option<String>,
    pub race: Option<String>,
    pub class: Option<String>,
    pub level: Option<String>,
    pub bio: Option<String>,
    pub looking_for: Option<String>,
    pub experience_level: Option<String>,
    pub timezone: Option<String>,
}

impl ProfileFields {
    /// Validate into the storable field set. Errors are the human-readable
    /// messages re-rendered into the form.
    pub fn validate(self) -> Result<ProfileData, String> {
        let name = self.name.unwrap_or_default().trim().to_string();
        if name.is_empty() {
            return Err("Character name is required".into());
        }

        let race = self.race.unwrap_or_default().trim().to_string();
        if race.is_empty() {
            return Err("Race is required".into());
        }
        let class = self.class.unwrap_or_default().trim().to_string();
        if class.is_empty() {
            return Err("Class is required".into());
        }

        let level = match self.level.as_deref().map(str::trim) {
            None | Some("") => 1,
            Some(raw) => raw.parse::<i64>().ok().filter(|l| *l >= 1).ok_or_else(|| {
                "Level must be a whole number of 1 or more".to_string()
            })?,
        };

        let experience_level = match self.experience_level.as_deref().map(str::trim) {
            None | Some("") => EXPERIENCE_LEVELS[0].to_string(),
            Some(v) if EXPERIENCE_LEVELS.contains(&v) => v.to_string(),
            Some(_) => return Err("Unknown experience level".into()),
        };

        let timezone = match self.timezone.as_deref().map(str::trim) {
            None | Some("") => "UTC".to_string(),
            Some(v) if TIMEZONES.contains(&v) => v.to_string(),
            Some(_) => return Err("Unknown timezone".into()),
        };

        // Normalize the tag list to a clean comma-joined form.
        let looking_for = self
            .looking_for
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(",");

        let bio = self
            .bio
            .map(|b| b.trim().to_string())
            .filter(|b| !b.is_empty());

        Ok(ProfileData {
            name,
            race,
            class,
            level,
            bio,
            looking_for,
            experience_level,
            timezone,
        })
    }
}

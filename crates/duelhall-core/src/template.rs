//! Arena templates: immutable descriptions of a contest's starting resources.
//!
//! A template names the environment to provision, the loadout handed to both
//! participants, and two spawn points. Placements derived from the spawns face
//! each other so the duel opens head-on.

use serde::{Deserialize, Serialize};

use crate::types::DuelError;

/// A stack of identical items in a loadout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemStack {
    pub item: String,
    #[serde(default = "default_count")]
    pub count: u32,
}

fn default_count() -> u32 {
    1
}

/// Items and armor given to each participant on activation.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Loadout {
    #[serde(default)]
    pub items: Vec<ItemStack>,
    #[serde(default)]
    pub armor: Vec<ItemStack>,
}

/// Integer block coordinates of a spawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SpawnPoint {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl SpawnPoint {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }
}

/// A spawn with an orientation, in degrees.
///
/// `yaw` is in `[0, 360)`, 0 facing +z and increasing clockwise seen from
/// above. `pitch` is positive when looking down.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub yaw: f32,
    pub pitch: f32,
}

impl Placement {
    /// Place at `from`, looking toward `to`.
    pub fn facing(from: SpawnPoint, to: SpawnPoint) -> Self {
        let dx = f64::from(to.x) - f64::from(from.x);
        let dy = f64::from(to.y) - f64::from(from.y);
        let dz = f64::from(to.z) - f64::from(from.z);

        let (yaw, pitch) = if dx == 0.0 && dz == 0.0 {
            // Straight up or down: yaw is meaningless.
            (0.0, if dy > 0.0 { -90.0 } else { 90.0 })
        } else {
            let tau = std::f64::consts::TAU;
            let theta = (-dx).atan2(dz);
            let yaw = ((theta + tau) % tau).to_degrees();
            let horizontal = (dx * dx + dz * dz).sqrt();
            let pitch = (-dy / horizontal).atan().to_degrees();
            (yaw, pitch)
        };

        Self {
            x: f64::from(from.x),
            y: f64::from(from.y),
            z: f64::from(from.z),
            yaw: yaw as f32,
            pitch: pitch as f32,
        }
    }
}

/// Immutable description of an arena: environment, loadout, two spawns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArenaTemplate {
    pub environment_id: String,
    /// Ambient time handed to the provisioner, if the environment has one.
    #[serde(default)]
    pub time_of_day: Option<u32>,
    #[serde(default)]
    pub loadout: Loadout,
    /// Requester spawns at index 0, respondent at index 1.
    pub spawns: [SpawnPoint; 2],
}

impl ArenaTemplate {
    pub fn new(environment_id: impl Into<String>, spawns: [SpawnPoint; 2]) -> Self {
        Self {
            environment_id: environment_id.into(),
            time_of_day: None,
            loadout: Loadout::default(),
            spawns,
        }
    }

    #[must_use]
    pub fn with_loadout(mut self, loadout: Loadout) -> Self {
        self.loadout = loadout;
        self
    }

    #[must_use]
    pub fn with_time_of_day(mut self, time: u32) -> Self {
        self.time_of_day = Some(time);
        self
    }

    pub fn validate(&self) -> Result<(), DuelError> {
        if self.environment_id.trim().is_empty() {
            return Err(DuelError::InvalidTemplate(
                "environment id is empty".to_owned(),
            ));
        }
        if self.spawns[0] == self.spawns[1] {
            return Err(DuelError::InvalidTemplate(format!(
                "spawns of {} coincide",
                self.environment_id
            )));
        }
        Ok(())
    }

    /// Requester and respondent placements, each facing the other.
    pub fn oriented_placements(&self) -> [Placement; 2] {
        let [a, b] = self.spawns;
        [Placement::facing(a, b), Placement::facing(b, a)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-3
    }

    fn template() -> ArenaTemplate {
        ArenaTemplate::new(
            "duel_plains",
            [SpawnPoint::new(0, 64, 0), SpawnPoint::new(0, 64, 10)],
        )
    }

    #[test]
    fn placements_face_each_other_along_z() {
        let [a, b] = template().oriented_placements();
        assert!(approx(a.yaw, 0.0), "yaw was {}", a.yaw);
        assert!(approx(b.yaw, 180.0), "yaw was {}", b.yaw);
        assert!(approx(a.pitch, 0.0));
        assert!(approx(b.pitch, 0.0));
        assert_eq!((b.x, b.y, b.z), (0.0, 64.0, 10.0));
    }

    #[test]
    fn placements_face_each_other_along_x() {
        let t = ArenaTemplate::new(
            "duel_plains",
            [SpawnPoint::new(0, 64, 0), SpawnPoint::new(10, 64, 0)],
        );
        let [a, b] = t.oriented_placements();
        // +x is yaw 270, -x is yaw 90.
        assert!(approx(a.yaw, 270.0), "yaw was {}", a.yaw);
        assert!(approx(b.yaw, 90.0), "yaw was {}", b.yaw);
    }

    #[test]
    fn lower_spawn_looks_up() {
        let t = ArenaTemplate::new(
            "tower",
            [SpawnPoint::new(0, 60, 0), SpawnPoint::new(0, 70, 10)],
        );
        let [low, high] = t.oriented_placements();
        assert!(low.pitch < 0.0);
        assert!(high.pitch > 0.0);
    }

    #[test]
    fn vertical_alignment_has_straight_pitch() {
        let t = ArenaTemplate::new("pit", [SpawnPoint::new(0, 60, 0), SpawnPoint::new(0, 80, 0)]);
        let [low, high] = t.oriented_placements();
        assert!(approx(low.pitch, -90.0));
        assert!(approx(high.pitch, 90.0));
    }

    #[test]
    fn validate_rejects_coincident_spawns() {
        let t = ArenaTemplate::new("pit", [SpawnPoint::new(1, 2, 3), SpawnPoint::new(1, 2, 3)]);
        assert!(matches!(t.validate(), Err(DuelError::InvalidTemplate(_))));
    }

    #[test]
    fn validate_rejects_blank_environment() {
        let t = ArenaTemplate::new("  ", [SpawnPoint::new(0, 0, 0), SpawnPoint::new(1, 0, 0)]);
        assert!(t.validate().is_err());
        assert!(template().validate().is_ok());
    }

    #[test]
    fn deserializes_with_defaults() {
        let json = r#"{
            "environment_id": "duel_plains",
            "loadout": { "items": [{ "item": "iron_sword" }, { "item": "bread", "count": 8 }] },
            "spawns": [{ "x": 0, "y": 64, "z": 0 }, { "x": 0, "y": 64, "z": 10 }]
        }"#;
        let t: ArenaTemplate = serde_json::from_str(json).expect("deserialize");
        assert_eq!(t.time_of_day, None);
        assert_eq!(t.loadout.items[0].count, 1);
        assert_eq!(t.loadout.items[1].count, 8);
        assert!(t.loadout.armor.is_empty());
    }
}

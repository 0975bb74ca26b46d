/// ASPRS classification code for low points (noise).
/// Excluded from cell statistics but still counted per cell.
pub const NOISE_CLASSIFICATION: u8 = 7;

pub struct ClassInfo {
    pub id: u8,
    pub name: &'static str,
}

pub const CLASS_MAP: &[ClassInfo] = &[
    ClassInfo {
        id: 0,
        name: "created, never classified",
    },
    ClassInfo {
        id: 1,
        name: "unclassified",
    },
    ClassInfo {
        id: 2,
        name: "ground",
    },
    ClassInfo {
        id: 3,
        name: "vegetation - low",
    },
    ClassInfo {
        id: 4,
        name: "vegetation - medium",
    },
    ClassInfo {
        id: 5,
        name: "vegetation - high",
    },
    ClassInfo {
        id: 6,
        name: "building",
    },
    ClassInfo {
        id: 7,
        name: "low point (noise)",
    },
    ClassInfo {
        id: 9,
        name: "water",
    },
];

pub fn get_class_name(id: u8) -> String {
    CLASS_MAP
        .iter()
        .find(|c| c.id == id)
        .map_or("unknown", |c| c.name)
        .to_string()
}

/// True when the classification code marks a noise point.
pub fn is_noise(id: u8) -> bool {
    id == NOISE_CLASSIFICATION
}

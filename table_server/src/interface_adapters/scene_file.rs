// JSON scene description loaded at startup: a list of boxes the tokens rest on.

use crate::domain::{ColliderId, StaticCollider, StaticScene};
use glam::Vec3;
use serde::Deserialize;
use std::{fmt, path::Path};

#[derive(Debug, Deserialize)]
pub struct SceneFileDto {
    pub colliders: Vec<ColliderDto>,
}

#[derive(Debug, Deserialize)]
pub struct ColliderDto {
    #[serde(default)]
    pub id: Option<u64>,
    pub min: [f32; 3],
    pub max: [f32; 3],
    #[serde(default)]
    pub top_normal: Option<[f32; 3]>,
}

#[derive(Debug)]
pub enum SceneFileError {
    Io(std::io::Error),
    Json(serde_json::Error),
    NonFinite { index: usize },
}

impl fmt::Display for SceneFileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SceneFileError::Io(e) => write!(f, "failed to read scene file: {e}"),
            SceneFileError::Json(e) => write!(f, "invalid scene json: {e}"),
            SceneFileError::NonFinite { index } => write!(f, "collider {index} has non-finite bounds"),
        }
    }
}

impl std::error::Error for SceneFileError {}

pub fn parse_scene(json: &str) -> Result<StaticScene, SceneFileError> {
    let dto: SceneFileDto = serde_json::from_str(json).map_err(SceneFileError::Json)?;

    let mut colliders = Vec::with_capacity(dto.colliders.len());
    for (index, collider) in dto.colliders.into_iter().enumerate() {
        let min = Vec3::from_array(collider.min);
        let max = Vec3::from_array(collider.max);
        if !min.is_finite() || !max.is_finite() {
            return Err(SceneFileError::NonFinite { index });
        }
        // Ids default to the position in the file.
        let id = ColliderId(collider.id.unwrap_or(index as u64));
        let mut built = StaticCollider::new(id, min, max);
        if let Some(normal) = collider.top_normal {
            built = built.with_top_normal(Vec3::from_array(normal));
        }
        colliders.push(built);
    }

    Ok(StaticScene::new(colliders))
}

pub fn load_scene(path: &Path) -> Result<StaticScene, SceneFileError> {
    let json = std::fs::read_to_string(path).map_err(SceneFileError::Io)?;
    parse_scene(&json)
}

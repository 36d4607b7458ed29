use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Length of the descriptors produced by the recognition model.
pub const DESCRIPTOR_LEN: usize = 128;

/// Face embedding produced by one capture.
///
/// The vector is fixed once built; callers get read-only access through
/// [`FaceDescriptor::as_slice`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f32>", into = "Vec<f32>")]
pub struct FaceDescriptor {
    values: Vec<f32>,
}

impl FaceDescriptor {
    pub fn new(values: Vec<f32>) -> Result<Self> {
        if values.len() != DESCRIPTOR_LEN {
            anyhow::bail!(
                "face descriptor has {} values, expected {}",
                values.len(),
                DESCRIPTOR_LEN
            );
        }
        if let Some(idx) = values.iter().position(|v| !v.is_finite()) {
            anyhow::bail!("face descriptor value at index {} is not finite", idx);
        }
        Ok(Self { values })
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Euclidean distance to `other`.
    pub fn distance(&self, other: &FaceDescriptor) -> Result<f32> {
        euclidean_distance(&self.values, &other.values)
    }
}

impl TryFrom<Vec<f32>> for FaceDescriptor {
    type Error = anyhow::Error;

    fn try_from(values: Vec<f32>) -> Result<Self> {
        Self::new(values)
    }
}

impl From<FaceDescriptor> for Vec<f32> {
    fn from(descriptor: FaceDescriptor) -> Self {
        descriptor.values
    }
}

pub fn euclidean_distance(a: &[f32], b: &[f32]) -> Result<f32> {
    if a.len() != b.len() {
        anyhow::bail!(
            "descriptor length mismatch: {} vs {}",
            a.len(),
            b.len()
        );
    }
    let sum: f32 = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum();
    Ok(sum.sqrt())
}

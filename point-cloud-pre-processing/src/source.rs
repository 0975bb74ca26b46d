/// Chunked point streams consumed by the statistics and binning passes.
use crate::error::{GridError, GridResult};

/// Columnar batch of points. All arrays share one length.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointChunk {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub z: Vec<f64>,
    pub veg_height: Vec<f64>,
    pub classification: Vec<u8>,
}

impl PointChunk {
    /// Create an empty chunk with room for `capacity` points
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            x: Vec::with_capacity(capacity),
            y: Vec::with_capacity(capacity),
            z: Vec::with_capacity(capacity),
            veg_height: Vec::with_capacity(capacity),
            classification: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, x: f64, y: f64, z: f64, veg_height: f64, classification: u8) {
        self.x.push(x);
        self.y.push(y);
        self.z.push(z);
        self.veg_height.push(veg_height);
        self.classification.push(classification);
    }

    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    pub fn clear(&mut self) {
        self.x.clear();
        self.y.clear();
        self.z.clear();
        self.veg_height.clear();
        self.classification.clear();
    }

    /// Reject chunks whose columns disagree in length
    pub fn validate(&self) -> GridResult<()> {
        let n = self.x.len();
        let lengths = [
            self.y.len(),
            self.z.len(),
            self.veg_height.len(),
            self.classification.len(),
        ];
        if lengths.iter().any(|&len| len != n) {
            return Err(GridError::MalformedChunk {
                reason: format!(
                    "column lengths differ: x={} y={} z={} veg={} class={}",
                    n, lengths[0], lengths[1], lengths[2], lengths[3]
                ),
            });
        }
        Ok(())
    }
}

/// A re-openable sequence of point chunks.
///
/// Every call to `for_each_chunk` starts a fresh pass from the first point, so
/// the two-pass pipeline can read the same source twice without buffering it.
pub trait PointSource {
    /// Stream the points in chunks of at most `chunk_size`
    fn for_each_chunk(
        &self,
        chunk_size: usize,
        visit: &mut dyn FnMut(&PointChunk) -> GridResult<()>,
    ) -> GridResult<()>;

    /// Total point count when known up front, used for progress reporting
    fn point_count_hint(&self) -> Option<u64> {
        None
    }
}

/// In-memory point source.
#[derive(Debug, Clone, Default)]
pub struct VecPointSource {
    points: PointChunk,
}

impl VecPointSource {
    pub fn new(points: PointChunk) -> GridResult<Self> {
        points.validate()?;
        Ok(Self { points })
    }

    /// Build from (x, y, z, veg_height, classification) tuples
    pub fn from_points(points: &[(f64, f64, f64, f64, u8)]) -> Self {
        let mut chunk = PointChunk::with_capacity(points.len());
        for &(x, y, z, veg, class) in points {
            chunk.push(x, y, z, veg, class);
        }
        Self { points: chunk }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

impl PointSource for VecPointSource {
    fn for_each_chunk(
        &self,
        chunk_size: usize,
        visit: &mut dyn FnMut(&PointChunk) -> GridResult<()>,
    ) -> GridResult<()> {
        let chunk_size = chunk_size.max(1);
        let total = self.points.len();
        let mut start = 0;
        while start < total {
            let end = (start + chunk_size).min(total);
            let chunk = PointChunk {
                x: self.points.x[start..end].to_vec(),
                y: self.points.y[start..end].to_vec(),
                z: self.points.z[start..end].to_vec(),
                veg_height: self.points.veg_height[start..end].to_vec(),
                classification: self.points.classification[start..end].to_vec(),
            };
            visit(&chunk)?;
            start = end;
        }
        Ok(())
    }

    fn point_count_hint(&self) -> Option<u64> {
        Some(self.points.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunks_cover_every_point_once() {
        let points: Vec<_> = (0..10)
            .map(|i| (i as f64, 0.0, 0.0, i as f64, 2))
            .collect();
        let source = VecPointSource::from_points(&points);

        let mut sizes = Vec::new();
        let mut seen = Vec::new();
        source
            .for_each_chunk(4, &mut |chunk| {
                sizes.push(chunk.len());
                seen.extend_from_slice(&chunk.x);
                Ok(())
            })
            .unwrap();

        assert_eq!(sizes, vec![4, 4, 2]);
        assert_eq!(seen, (0..10).map(|i| i as f64).collect::<Vec<_>>());
    }

    #[test]
    fn ragged_chunk_is_rejected() {
        let chunk = PointChunk {
            x: vec![1.0, 2.0],
            y: vec![1.0],
            z: vec![1.0, 2.0],
            veg_height: vec![1.0, 2.0],
            classification: vec![1, 1],
        };
        assert!(matches!(
            VecPointSource::new(chunk),
            Err(GridError::MalformedChunk { .. })
        ));
    }
}

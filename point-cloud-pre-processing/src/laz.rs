/// LAS/LAZ point source with vegetation height dimension probing.
use crate::error::{GridError, GridResult};
use crate::source::{PointChunk, PointSource};
use constants::processing::{GPS_TIME_DIMENSION, NDSM_DIMENSION};
use las::{Header, Point, Reader};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const EXTRA_BYTES_USER_ID: &str = "LASF_Spec";
const EXTRA_BYTES_RECORD_ID: u16 = 4;
const DESCRIPTOR_LEN: usize = 192;

const OPTION_SCALE: u8 = 0x08;
const OPTION_OFFSET: u8 = 0x10;

/// Create LAS file reader for point cloud access.
/// Handles both .las and .laz compressed formats.
pub fn create_reader(file_path: &Path) -> GridResult<Reader> {
    let file = File::open(file_path)?;
    let buf_reader = BufReader::new(file);
    Ok(Reader::new(buf_reader)?)
}

/// Scalar type of an Extra Bytes field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtraBytesType {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    U64,
    I64,
    F32,
    F64,
}

impl ExtraBytesType {
    fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            1 => Self::U8,
            2 => Self::I8,
            3 => Self::U16,
            4 => Self::I16,
            5 => Self::U32,
            6 => Self::I32,
            7 => Self::U64,
            8 => Self::I64,
            9 => Self::F32,
            10 => Self::F64,
            _ => return None,
        })
    }

    fn size(self) -> usize {
        match self {
            Self::U8 | Self::I8 => 1,
            Self::U16 | Self::I16 => 2,
            Self::U32 | Self::I32 | Self::F32 => 4,
            Self::U64 | Self::I64 | Self::F64 => 8,
        }
    }

    fn decode(self, bytes: &[u8]) -> Option<f64> {
        let raw = bytes.get(..self.size())?;
        Some(match self {
            Self::U8 => raw[0] as f64,
            Self::I8 => raw[0] as i8 as f64,
            Self::U16 => u16::from_le_bytes(raw.try_into().ok()?) as f64,
            Self::I16 => i16::from_le_bytes(raw.try_into().ok()?) as f64,
            Self::U32 => u32::from_le_bytes(raw.try_into().ok()?) as f64,
            Self::I32 => i32::from_le_bytes(raw.try_into().ok()?) as f64,
            Self::U64 => u64::from_le_bytes(raw.try_into().ok()?) as f64,
            Self::I64 => i64::from_le_bytes(raw.try_into().ok()?) as f64,
            Self::F32 => f32::from_le_bytes(raw.try_into().ok()?) as f64,
            Self::F64 => f64::from_le_bytes(raw.try_into().ok()?),
        })
    }
}

/// Where a point's vegetation height is read from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VegetationDimension {
    /// Named Extra Bytes field at a byte offset within each point's extra bytes
    Ndsm {
        byte_offset: usize,
        kind: ExtraBytesType,
        scale: f64,
        offset: f64,
    },
    /// GPS time field reused as vegetation height
    GpsTime,
}

impl VegetationDimension {
    /// Inspect the header and pick `ndsm` when declared, otherwise GPS time
    pub fn from_header(header: &Header) -> GridResult<Self> {
        if let Some(ndsm) = find_extra_dimension(header, NDSM_DIMENSION)? {
            return Ok(ndsm);
        }
        if !header.point_format().has_gps_time {
            return Err(GridError::Dimension {
                name: GPS_TIME_DIMENSION.to_string(),
                reason: format!(
                    "point format {:?} has neither '{}' nor GPS time",
                    header.point_format().to_u8(),
                    NDSM_DIMENSION
                ),
            });
        }
        Ok(Self::GpsTime)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Ndsm { .. } => NDSM_DIMENSION,
            Self::GpsTime => GPS_TIME_DIMENSION,
        }
    }

    /// Vegetation height of a single point
    pub fn read(&self, point: &Point) -> GridResult<f64> {
        match *self {
            Self::Ndsm {
                byte_offset,
                kind,
                scale,
                offset,
            } => {
                let raw = point
                    .extra_bytes
                    .get(byte_offset..)
                    .and_then(|bytes| kind.decode(bytes))
                    .ok_or_else(|| GridError::Dimension {
                        name: NDSM_DIMENSION.to_string(),
                        reason: format!(
                            "point carries {} extra bytes, field needs {} at offset {}",
                            point.extra_bytes.len(),
                            kind.size(),
                            byte_offset
                        ),
                    })?;
                Ok(raw * scale + offset)
            }
            Self::GpsTime => point.gps_time.ok_or_else(|| GridError::Dimension {
                name: GPS_TIME_DIMENSION.to_string(),
                reason: "point has no GPS time".to_string(),
            }),
        }
    }
}

/// Walk the Extra Bytes descriptors looking for `name`, tracking the byte offset.
fn find_extra_dimension(header: &Header, name: &str) -> GridResult<Option<VegetationDimension>> {
    let descriptors = header.vlrs().iter().chain(header.evlrs()).filter(|vlr| {
        vlr.record_id == EXTRA_BYTES_RECORD_ID
            && vlr.user_id.trim_end_matches('\0') == EXTRA_BYTES_USER_ID
    });

    let mut byte_offset = 0usize;
    for vlr in descriptors {
        for descriptor in vlr.data.chunks_exact(DESCRIPTOR_LEN) {
            let code = descriptor[2];
            let options = descriptor[3];
            let field = String::from_utf8_lossy(&descriptor[4..36]);
            let field = field.trim_end_matches('\0').trim();

            if field == name {
                let kind = ExtraBytesType::from_code(code).ok_or_else(|| GridError::Dimension {
                    name: name.to_string(),
                    reason: format!("unsupported extra bytes data type {}", code),
                })?;
                let scale = if options & OPTION_SCALE != 0 {
                    read_f64(descriptor, 112)
                } else {
                    1.0
                };
                let offset = if options & OPTION_OFFSET != 0 {
                    read_f64(descriptor, 136)
                } else {
                    0.0
                };
                debug!(name, byte_offset, ?kind, scale, offset, "Extra bytes field located");
                return Ok(Some(VegetationDimension::Ndsm {
                    byte_offset,
                    kind,
                    scale,
                    offset,
                }));
            }

            byte_offset += descriptor_size(code, options);
        }
    }
    Ok(None)
}

/// Bytes occupied by a descriptor in each point record
fn descriptor_size(code: u8, options: u8) -> usize {
    match code {
        // Undocumented bytes: the options field carries the length
        0 => options as usize,
        1..=10 => ExtraBytesType::from_code(code).map_or(0, ExtraBytesType::size),
        // Deprecated two- and three-element arrays
        11..=30 => {
            let base = ExtraBytesType::from_code((code - 11) % 10 + 1).map_or(0, ExtraBytesType::size);
            base * ((code as usize - 11) / 10 + 2)
        }
        _ => 0,
    }
}

fn read_f64(descriptor: &[u8], at: usize) -> f64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&descriptor[at..at + 8]);
    f64::from_le_bytes(bytes)
}

/// Point source backed by a LAS or LAZ file on disk.
#[derive(Debug, Clone)]
pub struct LasPointSource {
    path: PathBuf,
    dimension: VegetationDimension,
    point_count: u64,
}

impl LasPointSource {
    /// Open the file once to read the header and settle the vegetation dimension
    pub fn open(path: impl AsRef<Path>) -> GridResult<Self> {
        let path = path.as_ref().to_path_buf();
        let reader = create_reader(&path)?;
        let header = reader.header();
        let dimension = VegetationDimension::from_header(header)?;
        let point_count = header.number_of_points();

        info!(
            file = %path.display(),
            version = %format!("{}.{}", header.version().major, header.version().minor),
            points = point_count,
            dimension = dimension.name(),
            "Using '{}' dimension for vegetation height",
            dimension.name()
        );

        Ok(Self {
            path,
            dimension,
            point_count,
        })
    }

    pub fn dimension(&self) -> VegetationDimension {
        self.dimension
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PointSource for LasPointSource {
    fn for_each_chunk(
        &self,
        chunk_size: usize,
        visit: &mut dyn FnMut(&PointChunk) -> GridResult<()>,
    ) -> GridResult<()> {
        let chunk_size = chunk_size.max(1);
        let mut reader = create_reader(&self.path)?;
        let mut chunk = PointChunk::with_capacity(chunk_size.min(self.point_count as usize));

        for point_result in reader.points() {
            let point = point_result?;
            let veg_height = self.dimension.read(&point)?;
            chunk.push(
                point.x,
                point.y,
                point.z,
                veg_height,
                u8::from(point.classification),
            );

            if chunk.len() >= chunk_size {
                visit(&chunk)?;
                chunk.clear();
            }
        }

        if !chunk.is_empty() {
            visit(&chunk)?;
        }
        Ok(())
    }

    fn point_count_hint(&self) -> Option<u64> {
        Some(self.point_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(name: &str, code: u8, options: u8, scale: f64, offset: f64) -> Vec<u8> {
        let mut bytes = vec![0u8; DESCRIPTOR_LEN];
        bytes[2] = code;
        bytes[3] = options;
        bytes[4..4 + name.len()].copy_from_slice(name.as_bytes());
        bytes[112..120].copy_from_slice(&scale.to_le_bytes());
        bytes[136..144].copy_from_slice(&offset.to_le_bytes());
        bytes
    }

    #[test]
    fn decode_respects_width_and_sign() {
        assert_eq!(ExtraBytesType::I16.decode(&(-300i16).to_le_bytes()), Some(-300.0));
        assert_eq!(ExtraBytesType::F32.decode(&2.5f32.to_le_bytes()), Some(2.5));
        assert_eq!(ExtraBytesType::U32.decode(&[1, 0]), None);
    }

    #[test]
    fn descriptor_sizes() {
        assert_eq!(descriptor_size(0, 3), 3);
        assert_eq!(descriptor_size(9, 0), 4);
        assert_eq!(descriptor_size(10, 0), 8);
        // Deprecated 3-element f64 array
        assert_eq!(descriptor_size(30, 0), 24);
    }

    #[test]
    fn ndsm_found_after_other_fields() {
        let mut data = descriptor("object", 9, 0, 0.0, 0.0);
        data.extend(descriptor("ndsm", 4, OPTION_SCALE | OPTION_OFFSET, 0.01, 1.0));

        let mut builder = las::Builder::from((1, 4));
        builder.point_format = las::point::Format::new(1).unwrap();
        builder.point_format.extra_bytes = 6;
        builder.vlrs.push(las::Vlr {
            user_id: EXTRA_BYTES_USER_ID.to_string(),
            record_id: EXTRA_BYTES_RECORD_ID,
            description: String::new(),
            data,
        });
        let header = builder.into_header().unwrap();

        let dimension = VegetationDimension::from_header(&header).unwrap();
        assert_eq!(
            dimension,
            VegetationDimension::Ndsm {
                byte_offset: 4,
                kind: ExtraBytesType::I16,
                scale: 0.01,
                offset: 1.0,
            }
        );

        let mut point = Point::default();
        point.extra_bytes = vec![0, 0, 0, 0];
        point.extra_bytes.extend_from_slice(&250i16.to_le_bytes());
        assert!((dimension.read(&point).unwrap() - 3.5).abs() < 1e-9);
    }

    #[test]
    fn falls_back_to_gps_time() {
        let mut builder = las::Builder::from((1, 4));
        builder.point_format = las::point::Format::new(1).unwrap();
        let header = builder.into_header().unwrap();
        assert_eq!(
            VegetationDimension::from_header(&header).unwrap(),
            VegetationDimension::GpsTime
        );
    }

    #[test]
    fn format_without_gps_time_is_rejected() {
        let mut builder = las::Builder::from((1, 4));
        builder.point_format = las::point::Format::new(0).unwrap();
        let header = builder.into_header().unwrap();
        assert!(matches!(
            VegetationDimension::from_header(&header),
            Err(GridError::Dimension { .. })
        ));
    }
}

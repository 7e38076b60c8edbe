//! Loader for JPK force spectroscopy archives.
//!
//! `.jpk-force`, `.jpk-force-map` and `.jpk-qi-data` files are zip archives:
//! - `header.properties` with the acquisition settings
//! - `shared-data/header.properties` (maps and QI only) holding the channel
//!   calibrations the segment headers refer to
//! - `[index/<curve>/]segments/<segment>/segment-header.properties`
//! - `.../channels/<channel>.dat` with big-endian raw samples

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::{Path, PathBuf};

use regex::Regex;
use thiserror::Error;
use zip::ZipArchive;

use super::curve::{ForceCurve, Segment, SegmentKind};
use super::properties::{Properties, PropertiesError};

/// Errors that can occur during file loading.
#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Header error: {0}")]
    Properties(#[from] PropertiesError),

    #[error("Unsupported file type: {0}")]
    UnsupportedFileType(PathBuf),

    #[error("Missing archive entry: {0}")]
    MissingEntry(String),

    #[error("Missing channel '{channel}' in curve {curve}, segment {segment}")]
    MissingChannel {
        channel: String,
        curve: usize,
        segment: usize,
    },

    #[error("Unknown data type '{data_type}' for channel '{channel}'")]
    UnknownDataType { channel: String, data_type: String },

    #[error("Channel '{channel}' has {actual} samples, expected {expected}")]
    LengthMismatch {
        channel: String,
        expected: usize,
        actual: usize,
    },

    #[error("Curve index {index} out of range (file has {count} curves)")]
    CurveOutOfRange { index: usize, count: usize },

    #[error("No segments found in {0}")]
    EmptyFile(PathBuf),
}

/// Result type for loader operations.
pub type Result<T> = std::result::Result<T, LoaderError>;

/// Supported instrument file flavours.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    JpkForce,
    JpkForceMap,
    JpkQiData,
}

impl FileType {
    /// Detect the file type from the file name.
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_string_lossy().to_ascii_lowercase();
        if name.ends_with(".jpk-force-map") {
            Some(Self::JpkForceMap)
        } else if name.ends_with(".jpk-qi-data") {
            Some(Self::JpkQiData)
        } else if name.ends_with(".jpk-force") {
            Some(Self::JpkForce)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::JpkForce => "jpk-force",
            Self::JpkForceMap => "jpk-force-map",
            Self::JpkQiData => "jpk-qi-data",
        }
    }

    /// JPK heights need [`ForceCurve::shift_height`] after loading.
    pub fn needs_height_shift(&self) -> bool {
        matches!(self, Self::JpkForce | Self::JpkForceMap | Self::JpkQiData)
    }
}

/// File-level metadata gathered from the headers.
#[derive(Debug, Clone)]
pub struct FileMetadata {
    pub file_type: FileType,
    pub file_name: String,
    pub closed_loop: bool,
    /// Deflection sensitivity in nm/V.
    pub defl_sens_nm_by_v: f64,
    /// Cantilever spring constant in N/m.
    pub spring_const_n_by_m: f64,
    /// Channel holding the piezo height.
    pub height_channel_key: String,
    pub curve_count: usize,
}

impl FileMetadata {
    /// Deflection sensitivity in m/V.
    pub fn defl_sens_m_by_v(&self) -> f64 {
        self.defl_sens_nm_by_v / 1e9
    }
}

const VDEFLECTION: &str = "vDeflection";
const CAPACITIVE_HEIGHT: &str = "capacitiveSensorHeight";
const MEASURED_HEIGHT: &str = "measuredHeight";
const HEIGHT_FALLBACKS: &[&str] = &[MEASURED_HEIGHT, CAPACITIVE_HEIGHT, "height", "strainGaugeHeight"];

/// Default sampling interval when a segment has no duration.
const DEFAULT_SAMPLE_INTERVAL_S: f64 = 1e-3;

/// Open JPK archive with its headers parsed and segments indexed.
pub struct JpkArchive<R: Read + Seek> {
    archive: ZipArchive<R>,
    metadata: FileMetadata,
    shared: Option<Properties>,
    /// curve index -> segment index -> segment directory inside the archive
    segments: BTreeMap<usize, BTreeMap<usize, String>>,
}

impl JpkArchive<BufReader<File>> {
    /// Open a JPK file from disk.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file_type = FileType::from_path(path)
            .ok_or_else(|| LoaderError::UnsupportedFileType(path.to_path_buf()))?;
        let file = File::open(path)?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        let archive = Self::from_reader(BufReader::new(file), file_type, &file_name)?;
        if archive.segments.is_empty() {
            return Err(LoaderError::EmptyFile(path.to_path_buf()));
        }
        Ok(archive)
    }
}

impl<R: Read + Seek> JpkArchive<R> {
    /// Build an archive from any seekable reader.
    pub fn from_reader(reader: R, file_type: FileType, file_name: &str) -> Result<Self> {
        let mut archive = ZipArchive::new(reader)?;

        let header = read_properties(&mut archive, "header.properties")?;
        let shared = if has_entry(&archive, "shared-data/header.properties") {
            Some(read_properties(&mut archive, "shared-data/header.properties")?)
        } else {
            None
        };

        let segments = index_segments(&archive);

        let closed_loop = header
            .find_suffix("force-settings.closed-loop")
            .or_else(|| shared.as_ref().and_then(|s| s.find_suffix("force-settings.closed-loop")))
            .map(|v| v.trim().eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        let height_channel_key = if closed_loop {
            CAPACITIVE_HEIGHT.to_string()
        } else {
            MEASURED_HEIGHT.to_string()
        };

        let mut loaded = Self {
            archive,
            metadata: FileMetadata {
                file_type,
                file_name: file_name.to_string(),
                closed_loop,
                defl_sens_nm_by_v: f64::NAN,
                spring_const_n_by_m: f64::NAN,
                height_channel_key,
                curve_count: segments.len(),
            },
            shared,
            segments,
        };

        loaded.read_calibration()?;
        Ok(loaded)
    }

    pub fn metadata(&self) -> &FileMetadata {
        &self.metadata
    }

    pub fn curve_count(&self) -> usize {
        self.segments.len()
    }

    /// Load the raw channels of one curve.
    pub fn curve(&mut self, index: usize) -> Result<ForceCurve> {
        let count = self.curve_count();
        let segment_dirs: Vec<(usize, String)> = self
            .segments
            .values()
            .nth(index)
            .ok_or(LoaderError::CurveOutOfRange { index, count })?
            .iter()
            .map(|(s, dir)| (*s, dir.clone()))
            .collect();

        let num_segments = segment_dirs.len();
        let mut segments = Vec::with_capacity(num_segments);

        for (position, (segment_index, dir)) in segment_dirs.into_iter().enumerate() {
            let header = read_properties(&mut self.archive, &format!("{}/segment-header.properties", dir))?;
            let shared = self.shared.as_ref();

            let kind = first_resolved(&header, shared, &SEGMENT_STYLE_KEYS)
                .and_then(|style| SegmentKind::from_style(&style))
                .unwrap_or_else(|| fallback_kind(position, num_segments));

            let vdeflection = self.read_channel(&header, &dir, VDEFLECTION, index, segment_index, &["volts"])?;

            let height_channel = self.pick_height_channel(&header);
            let zheight = self.read_channel(
                &header,
                &dir,
                &height_channel,
                index,
                segment_index,
                &["nominal", "calibrated"],
            )?;

            if zheight.len() != vdeflection.len() {
                return Err(LoaderError::LengthMismatch {
                    channel: height_channel,
                    expected: vdeflection.len(),
                    actual: zheight.len(),
                });
            }

            let n = vdeflection.len();
            let duration = first_resolved(&header, self.shared.as_ref(), &SEGMENT_DURATION_KEYS)
                .and_then(|v| v.trim().parse::<f64>().ok())
                .filter(|d| d.is_finite() && *d > 0.0)
                .unwrap_or(n.saturating_sub(1) as f64 * DEFAULT_SAMPLE_INTERVAL_S);

            segments.push(Segment::new(kind, linspace(0.0, duration, n), zheight, vdeflection));
        }

        log::debug!(
            "{}: curve {} loaded with {} segments",
            self.metadata.file_name,
            index,
            segments.len()
        );

        Ok(ForceCurve::new(index, segments))
    }

    fn pick_height_channel(&self, header: &Properties) -> String {
        let preferred = self.metadata.height_channel_key.as_str();
        let has = |name: &str| header.get(&format!("channel.{}.data.file.name", name)).is_some();
        if has(preferred) {
            return preferred.to_string();
        }
        HEIGHT_FALLBACKS
            .iter()
            .find(|name| has(name))
            .map(|name| name.to_string())
            .unwrap_or_else(|| preferred.to_string())
    }

    fn read_channel(
        &mut self,
        header: &Properties,
        segment_dir: &str,
        channel: &str,
        curve: usize,
        segment: usize,
        target_slots: &[&str],
    ) -> Result<Vec<f64>> {
        let shared = self.shared.as_ref();
        let file_name = header
            .get(&format!("channel.{}.data.file.name", channel))
            .ok_or_else(|| LoaderError::MissingChannel {
                channel: channel.to_string(),
                curve,
                segment,
            })?
            .to_string();

        let data_type = header
            .resolve(&format!("channel.{}.data.type", channel), shared)
            .unwrap_or_else(|| "float-data".to_string());
        let encoding = ChannelEncoding::from_headers(header, shared, channel, &data_type)?;
        let calibration = Calibration::from_headers(header, shared, channel, target_slots);

        let entry = format!("{}/{}", segment_dir, file_name);
        let mut bytes = Vec::new();
        self.archive
            .by_name(&entry)
            .map_err(|_| LoaderError::MissingEntry(entry.clone()))?
            .read_to_end(&mut bytes)?;

        let raw = encoding.decode(&bytes);

        if let Some(expected) = header
            .get(&format!("channel.{}.data.num-points", channel))
            .or_else(|| header.get("force-segment-header.num-points"))
            .and_then(|v| v.trim().parse::<usize>().ok())
        {
            if expected != raw.len() {
                return Err(LoaderError::LengthMismatch {
                    channel: channel.to_string(),
                    expected,
                    actual: raw.len(),
                });
            }
        }

        Ok(raw.into_iter().map(|v| calibration.apply(v)).collect())
    }

    fn read_calibration(&mut self) -> Result<()> {
        let Some((_, first_curve)) = self.segments.iter().next() else {
            return Ok(());
        };
        let Some((_, dir)) = first_curve.iter().next() else {
            return Ok(());
        };
        let dir = dir.clone();

        let header = read_properties(&mut self.archive, &format!("{}/segment-header.properties", dir))?;
        let shared = self.shared.as_ref();

        let conversion = |slot: &str| {
            conversion_keys(VDEFLECTION, &format!("conversion.{}.scaling.multiplier", slot))
                .iter()
                .find_map(|key| header.resolve_f64(key, shared).ok())
        };

        // distance is m/V, force is N/m on top of it
        self.metadata.defl_sens_nm_by_v = conversion("distance").map(|v| v * 1e9).unwrap_or(f64::NAN);
        self.metadata.spring_const_n_by_m = conversion("force").unwrap_or(f64::NAN);

        if self.metadata.defl_sens_nm_by_v.is_nan() || self.metadata.spring_const_n_by_m.is_nan() {
            log::warn!(
                "{}: calibration missing in headers (sensitivity {} nm/V, spring constant {} N/m)",
                self.metadata.file_name,
                self.metadata.defl_sens_nm_by_v,
                self.metadata.spring_const_n_by_m
            );
        }
        Ok(())
    }
}

/// Open a file and return its metadata together with the archive.
pub fn load_file<P: AsRef<Path>>(path: P) -> Result<JpkArchive<BufReader<File>>> {
    JpkArchive::open(path)
}

const SEGMENT_STYLE_KEYS: [&str; 3] = [
    "force-segment-header.settings.segment-settings.style",
    "force-segment-header-info.settings.segment-settings.style",
    "force-segment-header.settings.style",
];

const SEGMENT_DURATION_KEYS: [&str; 2] = [
    "force-segment-header.settings.segment-settings.duration",
    "force-segment-header-info.settings.segment-settings.duration",
];

fn first_resolved(header: &Properties, shared: Option<&Properties>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| header.resolve(key, shared))
}

fn fallback_kind(position: usize, count: usize) -> SegmentKind {
    if position == 0 {
        SegmentKind::Extend
    } else if position + 1 == count {
        SegmentKind::Retract
    } else {
        SegmentKind::Pause
    }
}

fn encoder_keys(channel: &str, suffix: &str) -> [String; 2] {
    [
        format!("channel.{}.data.encoder.{}", channel, suffix),
        format!("channel.{}.lcd-info.encoder.{}", channel, suffix),
    ]
}

fn conversion_keys(channel: &str, suffix: &str) -> [String; 2] {
    [
        format!("channel.{}.conversion-set.{}", channel, suffix),
        format!("channel.{}.lcd-info.conversion-set.{}", channel, suffix),
    ]
}

fn resolve_any(header: &Properties, shared: Option<&Properties>, keys: &[String]) -> Option<String> {
    keys.iter().find_map(|key| header.resolve(key, shared))
}

fn has_entry<R: Read + Seek>(archive: &ZipArchive<R>, name: &str) -> bool {
    archive.file_names().any(|n| n == name)
}

fn read_properties<R: Read + Seek>(archive: &mut ZipArchive<R>, name: &str) -> Result<Properties> {
    let mut text = String::new();
    archive
        .by_name(name)
        .map_err(|_| LoaderError::MissingEntry(name.to_string()))?
        .read_to_string(&mut text)?;
    Ok(Properties::parse(&text))
}

/// Group segment header entries by curve and segment index.
fn index_segments<R: Read + Seek>(archive: &ZipArchive<R>) -> BTreeMap<usize, BTreeMap<usize, String>> {
    let pattern = Regex::new(r"^(?:index/(\d+)/)?segments/(\d+)/segment-header\.properties$")
        .expect("segment header pattern is valid");

    let mut segments: BTreeMap<usize, BTreeMap<usize, String>> = BTreeMap::new();
    for name in archive.file_names() {
        let Some(caps) = pattern.captures(name) else {
            continue;
        };
        let curve = caps.get(1).and_then(|m| m.as_str().parse().ok()).unwrap_or(0);
        let Some(segment) = caps.get(2).and_then(|m| m.as_str().parse::<usize>().ok()) else {
            continue;
        };
        let dir = name.trim_end_matches("/segment-header.properties").to_string();
        segments.entry(curve).or_default().insert(segment, dir);
    }
    segments
}

/// Evenly spaced samples including both end points.
pub fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (n - 1) as f64;
            (0..n).map(|i| start + step * i as f64).collect()
        }
    }
}

/// Raw sample layout of a channel file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ChannelEncoding {
    Short { signed: bool, multiplier: f64, offset: f64 },
    Integer { signed: bool, multiplier: f64, offset: f64 },
    Long { multiplier: f64, offset: f64 },
    Float,
    Double,
}

impl ChannelEncoding {
    fn from_headers(
        header: &Properties,
        shared: Option<&Properties>,
        channel: &str,
        data_type: &str,
    ) -> Result<Self> {
        let encoder_type = resolve_any(header, shared, &encoder_keys(channel, "type")).unwrap_or_default();
        let multiplier = resolve_any(header, shared, &encoder_keys(channel, "scaling.multiplier"))
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(1.0);
        let offset = resolve_any(header, shared, &encoder_keys(channel, "scaling.offset"))
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(0.0);
        let signed = !encoder_type.trim().starts_with("unsigned");

        let kind = data_type.trim().trim_end_matches("-data");
        let kind = kind.strip_prefix("memory-").unwrap_or(kind);
        match kind {
            "short" => Ok(Self::Short { signed, multiplier, offset }),
            "integer" => Ok(Self::Integer { signed, multiplier, offset }),
            "long" => Ok(Self::Long { multiplier, offset }),
            "float" => Ok(Self::Float),
            "double" => Ok(Self::Double),
            _ => Err(LoaderError::UnknownDataType {
                channel: channel.to_string(),
                data_type: data_type.to_string(),
            }),
        }
    }

    /// Decode big-endian samples into base-slot values.
    pub fn decode(&self, bytes: &[u8]) -> Vec<f64> {
        match *self {
            Self::Short { signed, multiplier, offset } => bytes
                .chunks_exact(2)
                .map(|c| {
                    let raw = if signed {
                        i16::from_be_bytes([c[0], c[1]]) as f64
                    } else {
                        u16::from_be_bytes([c[0], c[1]]) as f64
                    };
                    raw * multiplier + offset
                })
                .collect(),
            Self::Integer { signed, multiplier, offset } => bytes
                .chunks_exact(4)
                .map(|c| {
                    let b = [c[0], c[1], c[2], c[3]];
                    let raw = if signed {
                        i32::from_be_bytes(b) as f64
                    } else {
                        u32::from_be_bytes(b) as f64
                    };
                    raw * multiplier + offset
                })
                .collect(),
            Self::Long { multiplier, offset } => bytes
                .chunks_exact(8)
                .map(|c| {
                    let mut b = [0u8; 8];
                    b.copy_from_slice(c);
                    i64::from_be_bytes(b) as f64 * multiplier + offset
                })
                .collect(),
            Self::Float => bytes
                .chunks_exact(4)
                .map(|c| f32::from_be_bytes([c[0], c[1], c[2], c[3]]) as f64)
                .collect(),
            Self::Double => bytes
                .chunks_exact(8)
                .map(|c| {
                    let mut b = [0u8; 8];
                    b.copy_from_slice(c);
                    f64::from_be_bytes(b)
                })
                .collect(),
        }
    }
}

/// Chain of linear conversions from the base slot to a target slot.
#[derive(Debug, Clone, Default)]
pub struct Calibration {
    /// `(multiplier, offset)` pairs applied in order.
    pub steps: Vec<(f64, f64)>,
}

impl Calibration {
    const MAX_CHAIN: usize = 8;

    fn from_headers(
        header: &Properties,
        shared: Option<&Properties>,
        channel: &str,
        target_slots: &[&str],
    ) -> Self {
        let base = resolve_any(header, shared, &conversion_keys(channel, "conversions.base"))
            .unwrap_or_else(|| "volts".to_string());

        for target in target_slots {
            if *target == base {
                return Self::default();
            }
            if let Some(calibration) = Self::chain(header, shared, channel, &base, target) {
                return calibration;
            }
        }
        Self::default()
    }

    fn chain(
        header: &Properties,
        shared: Option<&Properties>,
        channel: &str,
        base: &str,
        target: &str,
    ) -> Option<Self> {
        let mut steps = Vec::new();
        let mut slot = target.to_string();

        while slot != base {
            if steps.len() >= Self::MAX_CHAIN {
                return None;
            }
            let key = |suffix: &str| conversion_keys(channel, &format!("conversion.{}.{}", slot, suffix));

            if let Some(defined) = resolve_any(header, shared, &key("defined")) {
                if defined.trim().eq_ignore_ascii_case("false") {
                    return None;
                }
            }
            let multiplier: f64 = resolve_any(header, shared, &key("scaling.multiplier"))?
                .trim()
                .parse()
                .ok()?;
            let offset: f64 = resolve_any(header, shared, &key("scaling.offset"))
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(0.0);
            let parent = resolve_any(header, shared, &key("base-calibration-slot"))
                .unwrap_or_else(|| base.to_string());

            steps.push((multiplier, offset));
            slot = parent;
        }

        steps.reverse();
        Some(Self { steps })
    }

    pub fn apply(&self, value: f64) -> f64 {
        self.steps.iter().fold(value, |v, (m, o)| v * m + o)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use std::io::Cursor;

    fn synthetic_archive(curves: usize) -> JpkArchive<Cursor<Vec<u8>>> {
        let bytes = fixtures::force_map_bytes(curves, false);
        JpkArchive::from_reader(Cursor::new(bytes), FileType::JpkForceMap, "synthetic.jpk-force-map").unwrap()
    }

    #[test]
    fn test_file_type_from_path() {
        assert_eq!(FileType::from_path(Path::new("a/b.jpk-force-map")), Some(FileType::JpkForceMap));
        assert_eq!(FileType::from_path(Path::new("b.jpk-force")), Some(FileType::JpkForce));
        assert_eq!(FileType::from_path(Path::new("b.JPK-QI-DATA")), Some(FileType::JpkQiData));
        assert_eq!(FileType::from_path(Path::new("b.csv")), None);
    }

    #[test]
    fn test_linspace() {
        assert_eq!(linspace(0.0, 1.0, 5), vec![0.0, 0.25, 0.5, 0.75, 1.0]);
        assert_eq!(linspace(2.0, 3.0, 1), vec![2.0]);
        assert!(linspace(0.0, 1.0, 0).is_empty());
    }

    #[test]
    fn test_decode_short_and_integer() {
        let short = ChannelEncoding::Short { signed: true, multiplier: 0.5, offset: 1.0 };
        assert_eq!(short.decode(&[0xff, 0xfe, 0x00, 0x04]), vec![0.0, 3.0]);

        let ushort = ChannelEncoding::Short { signed: false, multiplier: 1.0, offset: 0.0 };
        assert_eq!(ushort.decode(&[0xff, 0xff]), vec![65535.0]);

        let int = ChannelEncoding::Integer { signed: true, multiplier: 2.0, offset: 0.0 };
        assert_eq!(int.decode(&(-3i32).to_be_bytes()), vec![-6.0]);
    }

    #[test]
    fn test_decode_float_and_double() {
        let mut bytes = 1.5f32.to_be_bytes().to_vec();
        bytes.extend_from_slice(&(-2.0f32).to_be_bytes());
        assert_eq!(ChannelEncoding::Float.decode(&bytes), vec![1.5, -2.0]);
        assert_eq!(ChannelEncoding::Double.decode(&0.25f64.to_be_bytes()), vec![0.25]);
    }

    #[test]
    fn test_calibration_chain() {
        let header = Properties::parse(
            "channel.h.conversion-set.conversions.base=volts\n\
             channel.h.conversion-set.conversion.nominal.base-calibration-slot=volts\n\
             channel.h.conversion-set.conversion.nominal.scaling.multiplier=2.0\n\
             channel.h.conversion-set.conversion.nominal.scaling.offset=1.0\n\
             channel.h.conversion-set.conversion.calibrated.base-calibration-slot=nominal\n\
             channel.h.conversion-set.conversion.calibrated.scaling.multiplier=10.0\n",
        );
        let nominal = Calibration::from_headers(&header, None, "h", &["nominal"]);
        assert_eq!(nominal.apply(3.0), 7.0);

        let calibrated = Calibration::from_headers(&header, None, "h", &["calibrated"]);
        assert_eq!(calibrated.apply(3.0), 70.0);

        let missing = Calibration::from_headers(&header, None, "h", &["distance"]);
        assert_eq!(missing.apply(3.0), 3.0);
    }

    #[test]
    fn test_archive_metadata() {
        let archive = synthetic_archive(3);
        let meta = archive.metadata();

        assert_eq!(meta.file_type, FileType::JpkForceMap);
        assert_eq!(meta.curve_count, 3);
        assert!(!meta.closed_loop);
        assert_eq!(meta.height_channel_key, "measuredHeight");
        assert!((meta.defl_sens_nm_by_v - fixtures::DEF_SENS_M_PER_V * 1e9).abs() < 1e-9);
        assert!((meta.spring_const_n_by_m - fixtures::SPRING_CONSTANT).abs() < 1e-12);
    }

    #[test]
    fn test_archive_curve_segments() {
        let mut archive = synthetic_archive(2);
        let curve = archive.curve(1).unwrap();

        assert_eq!(curve.index, 1);
        assert_eq!(curve.segments.len(), 2);
        let ext = curve.extend().unwrap();
        let ret = curve.retract().unwrap();
        assert_eq!(ext.len(), fixtures::POINTS_PER_SEGMENT);
        assert_eq!(ret.len(), fixtures::POINTS_PER_SEGMENT);
        assert!((ext.duration() - fixtures::SEGMENT_DURATION_S).abs() < 1e-12);

        // raw heights decrease while extending
        assert!(ext.zheight.first().unwrap() > ext.zheight.last().unwrap());
        // baseline deflection carries the fixture offset
        assert!((ext.vdeflection[0] - fixtures::BASELINE_OFFSET_V).abs() < 1e-3);
    }

    #[test]
    fn test_archive_curve_out_of_range() {
        let mut archive = synthetic_archive(1);
        assert!(matches!(
            archive.curve(5),
            Err(LoaderError::CurveOutOfRange { index: 5, count: 1 })
        ));
    }

    #[test]
    fn test_closed_loop_uses_capacitive_height() {
        let bytes = fixtures::force_map_bytes(1, true);
        let mut archive =
            JpkArchive::from_reader(Cursor::new(bytes), FileType::JpkForceMap, "cl.jpk-force-map").unwrap();
        assert!(archive.metadata().closed_loop);
        assert_eq!(archive.metadata().height_channel_key, "capacitiveSensorHeight");
        // fixture only stores measuredHeight, loader falls back to it
        assert!(archive.curve(0).is_ok());
    }

    #[test]
    fn test_open_rejects_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("curve.txt");
        std::fs::write(&path, b"not a zip").unwrap();
        assert!(matches!(JpkArchive::open(&path), Err(LoaderError::UnsupportedFileType(_))));
    }
}

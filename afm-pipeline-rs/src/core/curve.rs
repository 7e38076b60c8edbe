//! Force curve and segment containers.

use std::fmt;

/// Role of a segment within a force curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    Extend,
    Retract,
    Pause,
    Modulation,
}

impl SegmentKind {
    /// Parse the JPK `segment-settings.style` value.
    pub fn from_style(style: &str) -> Option<Self> {
        match style.trim().to_ascii_lowercase().as_str() {
            "extend" | "approach" => Some(Self::Extend),
            "retract" => Some(Self::Retract),
            "pause" => Some(Self::Pause),
            "modulation" => Some(Self::Modulation),
            _ => None,
        }
    }
}

impl fmt::Display for SegmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Extend => "extend",
            Self::Retract => "retract",
            Self::Pause => "pause",
            Self::Modulation => "modulation",
        };
        f.write_str(name)
    }
}

/// One segment of a force curve. All quantities are SI.
///
/// `deflection`, `force` and `indentation` are empty until the curve has been
/// preprocessed and converted to force vs indentation.
#[derive(Debug, Clone)]
pub struct Segment {
    pub kind: SegmentKind,
    /// Time since the start of the segment (s).
    pub time: Vec<f64>,
    /// Piezo height (m).
    pub zheight: Vec<f64>,
    /// Raw vertical deflection (V).
    pub vdeflection: Vec<f64>,
    /// Cantilever deflection (m).
    pub deflection: Vec<f64>,
    /// Force (N).
    pub force: Vec<f64>,
    /// Indentation (m).
    pub indentation: Vec<f64>,
}

impl Segment {
    /// Create a segment from raw channels.
    pub fn new(kind: SegmentKind, time: Vec<f64>, zheight: Vec<f64>, vdeflection: Vec<f64>) -> Self {
        Self {
            kind,
            time,
            zheight,
            vdeflection,
            deflection: Vec::new(),
            force: Vec::new(),
            indentation: Vec::new(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.time.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    /// Segment duration in seconds.
    pub fn duration(&self) -> f64 {
        match (self.time.first(), self.time.last()) {
            (Some(first), Some(last)) => last - first,
            _ => 0.0,
        }
    }
}

/// A single force curve: ordered segments of one pixel of a force map.
#[derive(Debug, Clone)]
pub struct ForceCurve {
    /// Index of the curve within its file.
    pub index: usize,
    pub segments: Vec<Segment>,
}

impl ForceCurve {
    pub fn new(index: usize, segments: Vec<Segment>) -> Self {
        Self { index, segments }
    }

    /// Convert the raw deflection signal to metres.
    pub fn preprocess_force_curve(&mut self, def_sens: f64) {
        for segment in &mut self.segments {
            segment.deflection = segment.vdeflection.iter().map(|v| v * def_sens).collect();
        }
    }

    /// Shift the height so it starts at zero and grows towards the sample.
    ///
    /// JPK heights shrink while the piezo extends, so every height is taken
    /// relative to the highest point of the extend segments and negated.
    pub fn shift_height(&mut self) {
        let zero = self
            .segments
            .iter()
            .filter(|s| s.kind == SegmentKind::Extend)
            .flat_map(|s| s.zheight.iter().copied())
            .fold(f64::NEG_INFINITY, f64::max);

        if !zero.is_finite() {
            return;
        }

        for segment in &mut self.segments {
            for z in &mut segment.zheight {
                *z = zero - *z;
            }
        }
    }

    /// Extend segments with their positions in the curve.
    pub fn extend_segments(&self) -> Vec<(usize, &Segment)> {
        self.segments_of(SegmentKind::Extend)
    }

    /// Retract segments with their positions in the curve.
    pub fn retract_segments(&self) -> Vec<(usize, &Segment)> {
        self.segments_of(SegmentKind::Retract)
    }

    /// Extend and retract segments (pauses and modulations are skipped).
    pub fn get_segments(&self) -> Vec<(usize, &Segment)> {
        self.segments
            .iter()
            .enumerate()
            .filter(|(_, s)| matches!(s.kind, SegmentKind::Extend | SegmentKind::Retract))
            .collect()
    }

    /// First extend segment.
    pub fn extend(&self) -> Option<&Segment> {
        self.segments.iter().find(|s| s.kind == SegmentKind::Extend)
    }

    /// First retract segment.
    pub fn retract(&self) -> Option<&Segment> {
        self.segments.iter().find(|s| s.kind == SegmentKind::Retract)
    }

    /// True once force and indentation have been computed.
    pub fn has_force_indentation(&self) -> bool {
        self.get_segments()
            .iter()
            .all(|(_, s)| s.force.len() == s.len() && s.indentation.len() == s.len())
    }

    fn segments_of(&self, kind: SegmentKind) -> Vec<(usize, &Segment)> {
        self.segments
            .iter()
            .enumerate()
            .filter(|(_, s)| s.kind == kind)
            .collect()
    }
}

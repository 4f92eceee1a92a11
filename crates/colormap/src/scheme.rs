//! Color schemes and multi-stop interpolation engine.

use terraclass_core::{Error, Result};

/// RGB color as (r, g, b) with values in 0..=255.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse `#rrggbb` or `rrggbb`.
    pub fn from_hex(s: &str) -> Result<Self> {
        let hex = s.strip_prefix('#').unwrap_or(s);
        let invalid = || Error::invalid_parameter("color", s, "expected a #rrggbb hex color");
        if hex.len() != 6 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(invalid());
        }
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| invalid());
        Ok(Self::new(channel(0)?, channel(2)?, channel(4)?))
    }

    /// `#rrggbb` representation.
    pub fn to_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// A color stop: position in [0, 1] mapped to an RGB color.
#[derive(Debug, Clone, Copy)]
pub struct ColorStop {
    pub t: f64,
    pub color: Rgb,
}

impl ColorStop {
    pub const fn new(t: f64, r: u8, g: u8, b: u8) -> Self {
        Self {
            t,
            color: Rgb::new(r, g, b),
        }
    }
}

/// Available color schemes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorScheme {
    /// Twelve distinct land-cover colors (water, vegetation, soil, urban...)
    LandCover,
    /// Green -> Yellow -> Brown -> White
    Terrain,
    /// Brown -> Yellow -> Green
    Ndvi,
    /// Black -> White
    Grayscale,
    /// Purple -> Blue -> Green -> Yellow
    Viridis,
}

impl ColorScheme {
    /// All available schemes.
    pub const ALL: &[ColorScheme] = &[
        Self::LandCover,
        Self::Terrain,
        Self::Ndvi,
        Self::Grayscale,
        Self::Viridis,
    ];

    /// Human-readable name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::LandCover => "land-cover",
            Self::Terrain => "terrain",
            Self::Ndvi => "ndvi",
            Self::Grayscale => "grayscale",
            Self::Viridis => "viridis",
        }
    }

    /// Look a scheme up by its [`name`](Self::name), ignoring case.
    pub fn from_name(name: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|s| s.name().eq_ignore_ascii_case(name))
            .ok_or_else(|| {
                let known: Vec<&str> = Self::ALL.iter().map(|s| s.name()).collect();
                Error::invalid_parameter("scheme", name, format!("expected one of {}", known.join(", ")))
            })
    }
}

// ─── Color stop definitions ───────────────────────────────────────────

const TERRAIN_STOPS: &[ColorStop] = &[
    ColorStop::new(0.00, 34, 139, 34),
    ColorStop::new(0.25, 144, 190, 60),
    ColorStop::new(0.50, 220, 200, 80),
    ColorStop::new(0.75, 180, 120, 60),
    ColorStop::new(1.00, 255, 255, 255),
];

const NDVI_STOPS: &[ColorStop] = &[
    ColorStop::new(0.0, 120, 70, 20),
    ColorStop::new(0.3, 200, 170, 60),
    ColorStop::new(0.5, 240, 230, 100),
    ColorStop::new(0.7, 100, 180, 50),
    ColorStop::new(1.0, 10, 100, 20),
];

const VIRIDIS_STOPS: &[ColorStop] = &[
    ColorStop::new(0.00, 68, 1, 84),
    ColorStop::new(0.25, 59, 82, 139),
    ColorStop::new(0.50, 33, 145, 140),
    ColorStop::new(0.75, 94, 201, 98),
    ColorStop::new(1.00, 253, 231, 37),
];

/// Land-cover palette: 12 discrete classes.
const LAND_COVER_PALETTE: &[Rgb] = &[
    Rgb::new(31, 120, 180),  // water
    Rgb::new(51, 160, 44),   // dense vegetation
    Rgb::new(178, 223, 138), // sparse vegetation
    Rgb::new(227, 26, 28),   // built-up
    Rgb::new(253, 191, 111), // bare soil
    Rgb::new(166, 206, 227), // wetland
    Rgb::new(255, 127, 0),   // cropland
    Rgb::new(106, 61, 154),  // rock
    Rgb::new(251, 154, 153), // mixed urban
    Rgb::new(202, 178, 214), // shadow
    Rgb::new(177, 89, 40),   // exposed earth
    Rgb::new(255, 255, 153), // grassland
];

// ─── Interpolation engine ──────────────────────────────────────────────

fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

fn lerp_color(c1: Rgb, c2: Rgb, t: f64) -> Rgb {
    Rgb::new(
        lerp(c1.r as f64, c2.r as f64, t).round() as u8,
        lerp(c1.g as f64, c2.g as f64, t).round() as u8,
        lerp(c1.b as f64, c2.b as f64, t).round() as u8,
    )
}

fn multi_stop(stops: &[ColorStop], t: f64) -> Rgb {
    if t <= 0.0 {
        return stops[0].color;
    }
    if t >= 1.0 {
        return stops[stops.len() - 1].color;
    }
    for i in 1..stops.len() {
        if t <= stops[i].t {
            let ratio = (t - stops[i - 1].t) / (stops[i].t - stops[i - 1].t);
            return lerp_color(stops[i - 1].color, stops[i].color, ratio);
        }
    }
    stops[stops.len() - 1].color
}

/// Evaluate a color scheme at normalized position `t` ∈ [0, 1].
///
/// `LandCover` maps `t` to one of its discrete classes; the other
/// schemes interpolate linearly between their stops.
pub fn evaluate(scheme: ColorScheme, t: f64) -> Rgb {
    match scheme {
        ColorScheme::LandCover => {
            let n = LAND_COVER_PALETTE.len();
            let idx = (t * n as f64).floor().clamp(0.0, (n - 1) as f64) as usize;
            LAND_COVER_PALETTE[idx]
        }
        ColorScheme::Terrain => multi_stop(TERRAIN_STOPS, t),
        ColorScheme::Ndvi => multi_stop(NDVI_STOPS, t),
        ColorScheme::Grayscale => {
            let v = (t.clamp(0.0, 1.0) * 255.0).round() as u8;
            Rgb::new(v, v, v)
        }
        ColorScheme::Viridis => multi_stop(VIRIDIS_STOPS, t),
    }
}

/// `n` colors for `n` classes.
///
/// `LandCover` hands out its discrete colors in order and cycles once they
/// run out; continuous schemes are sampled evenly from 0 to 1.
pub fn sample(scheme: ColorScheme, n: usize) -> Vec<Rgb> {
    match scheme {
        ColorScheme::LandCover => (0..n)
            .map(|i| LAND_COVER_PALETTE[i % LAND_COVER_PALETTE.len()])
            .collect(),
        _ if n == 1 => vec![evaluate(scheme, 0.0)],
        _ => (0..n)
            .map(|i| evaluate(scheme, i as f64 / (n - 1) as f64))
            .collect(),
    }
}

//! Tonal-stage color math shared by the CPU pipeline and the shader uniforms.
//!
//! Every function is the identity at its neutral parameter, so the default
//! [`GradeParameters`](crate::params::GradeParameters) leaves pixels untouched.

use palette::{FromColor, Hsv, Srgb};

/// Rec. 709 luminance weights.
pub const LUMA_REC709: [f32; 3] = [0.2126, 0.7152, 0.0722];

pub const IDENTITY_3X3: [[f32; 3]; 3] = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];

pub fn luma(rgb: [f32; 3]) -> f32 {
    rgb[0] * LUMA_REC709[0] + rgb[1] * LUMA_REC709[1] + rgb[2] * LUMA_REC709[2]
}

/// Apply lift / gamma / gain with `[R, G, B, Master]` wheels.
///
/// ```text
/// l = lift[c] + lift[3]      g = gain[c] * gain[3]      γ = gamma[c] * gamma[3]
/// out = pow(max(g × (in + l × (1 − in)), 0), 1 / γ)
/// ```
pub fn apply_lift_gamma_gain(
    rgb: [f32; 3],
    lift: [f32; 4],
    gamma: [f32; 4],
    gain: [f32; 4],
) -> [f32; 3] {
    let mut out = [0.0_f32; 3];
    for c in 0..3 {
        let (l, g, gm) = combined_wheel(lift, gamma, gain, c);
        let v = (g * (rgb[c] + l * (1.0 - rgb[c]))).max(0.0);
        out[c] = if (gm - 1.0).abs() < 1e-7 { v } else { v.powf(1.0 / gm) };
    }
    out
}

/// Per-channel `(lift, gain, gamma)` after folding in the master wheel.
pub fn combined_wheel(lift: [f32; 4], gamma: [f32; 4], gain: [f32; 4], c: usize) -> (f32, f32, f32) {
    (
        lift[c] + lift[3],
        gain[c] * gain[3],
        (gamma[c] * gamma[3]).max(0.01),
    )
}

/// Exposure in stops: `out = in × 2^stops`.
pub fn apply_exposure(rgb: [f32; 3], stops: f32) -> [f32; 3] {
    let k = stops.exp2();
    [rgb[0] * k, rgb[1] * k, rgb[2] * k]
}

/// Saturation around Rec. 709 luma. `1.0` is neutral.
pub fn apply_saturation(rgb: [f32; 3], saturation: f32) -> [f32; 3] {
    let l = luma(rgb);
    [
        l + (rgb[0] - l) * saturation,
        l + (rgb[1] - l) * saturation,
        l + (rgb[2] - l) * saturation,
    ]
}

/// Linear contrast around mid grey: `out = (in − 0.5) × contrast + 0.5`.
pub fn apply_contrast(rgb: [f32; 3], contrast: f32) -> [f32; 3] {
    [
        (rgb[0] - 0.5) * contrast + 0.5,
        (rgb[1] - 0.5) * contrast + 0.5,
        (rgb[2] - 0.5) * contrast + 0.5,
    ]
}

pub fn mat3_mul(m: &[[f32; 3]; 3], rgb: [f32; 3]) -> [f32; 3] {
    [
        m[0][0] * rgb[0] + m[0][1] * rgb[1] + m[0][2] * rgb[2],
        m[1][0] * rgb[0] + m[1][1] * rgb[1] + m[1][2] * rgb[2],
        m[2][0] * rgb[0] + m[2][1] * rgb[1] + m[2][2] * rgb[2],
    ]
}

/// White balance as a 3×3 RGB matrix, computed once per tick.
///
/// Temperature moves the destination white along the Planckian locus
/// tangent at D65 and tint moves it perpendicular (green-magenta); the
/// matrix is the Bradford adaptation from D65 to that white. Both at zero
/// return [`IDENTITY_3X3`].
pub fn white_balance_matrix(temperature: f32, tint: f32) -> [[f32; 3]; 3] {
    if temperature.abs() < 1e-7 && tint.abs() < 1e-7 {
        return IDENTITY_3X3;
    }

    const D65: (f64, f64) = (0.3127, 0.3290);
    const SHIFT_SCALE: f64 = 0.05;
    // Locus tangent at D65; positive temperature warms.
    const TANGENT: (f64, f64) = (0.3585, 0.1501);

    const BRADFORD: [[f64; 3]; 3] = [
        [0.8951, 0.2664, -0.1614],
        [-0.7502, 1.7135, 0.0367],
        [0.0389, -0.0685, 1.0296],
    ];
    const BRADFORD_INV: [[f64; 3]; 3] = [
        [0.9869929055, -0.1470542564, 0.1599626517],
        [0.4323052697, 0.5183602715, 0.0492912282],
        [-0.0085286646, 0.0400428217, 0.9684866958],
    ];

    let t = temperature as f64 * SHIFT_SCALE;
    let p = tint as f64 * SHIFT_SCALE;
    let dst = (
        D65.0 + TANGENT.0 * t - TANGENT.1 * p,
        D65.1 + TANGENT.1 * t + TANGENT.0 * p,
    );

    let src_cone = mul3(&BRADFORD, xy_to_xyz(D65));
    let dst_cone = mul3(&BRADFORD, xy_to_xyz(dst));

    let mut out = [[0.0_f32; 3]; 3];
    for i in 0..3 {
        for j in 0..3 {
            let mut acc = 0.0;
            for k in 0..3 {
                acc += BRADFORD_INV[i][k] * (dst_cone[k] / src_cone[k]) * BRADFORD[k][j];
            }
            out[i][j] = acc as f32;
        }
    }
    out
}

fn xy_to_xyz((x, y): (f64, f64)) -> [f64; 3] {
    [x / y, 1.0, (1.0 - x - y) / y]
}

fn mul3(m: &[[f64; 3]; 3], v: [f64; 3]) -> [f64; 3] {
    [
        m[0][0] * v[0] + m[0][1] * v[1] + m[0][2] * v[2],
        m[1][0] * v[0] + m[1][1] * v[1] + m[1][2] * v[2],
        m[2][0] * v[0] + m[2][1] * v[1] + m[2][2] * v[2],
    ]
}

/// False-color ramp for the heatmap overlay: blue (dark) to red (bright).
pub fn heatmap(luma: f32) -> [f32; 3] {
    let hue = 240.0 * (1.0 - luma.clamp(0.0, 1.0));
    let rgb = Srgb::from_color(Hsv::new(hue, 1.0, 1.0));
    [rgb.red, rgb.green, rgb.blue]
}

pub fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

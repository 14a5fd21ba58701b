//! Facial regions, their landmark index groups and the fixed channel packing.
//!
//! Indices follow the 468-point face mesh topology.

/// Face oval, clockwise from the forehead.
pub const FACE_OVAL: &[usize] = &[
    10, 338, 297, 332, 284, 251, 389, 356, 454, 323, 361, 288, 397, 365, 379, 378, 400, 377, 152,
    148, 176, 149, 150, 136, 172, 58, 132, 93, 234, 127, 162, 21, 54, 103, 67, 109,
];

pub const LEFT_EYE: &[usize] = &[
    362, 382, 381, 380, 374, 373, 390, 249, 263, 466, 388, 387, 386, 385, 384, 398,
];

pub const RIGHT_EYE: &[usize] = &[
    33, 7, 163, 144, 145, 153, 154, 155, 133, 173, 157, 158, 159, 160, 161, 246,
];

/// Outer lip contour.
pub const LIPS: &[usize] = &[
    61, 146, 91, 181, 84, 17, 314, 405, 321, 375, 291, 409, 270, 269, 267, 0, 37, 39, 40, 185,
];

pub const NOSE: &[usize] = &[
    168, 193, 245, 188, 174, 217, 126, 142, 97, 2, 326, 371, 355, 437, 399, 412, 465, 417,
];

/// Jaw contour from the left ear down to the chin.
pub const LEFT_JAW: &[usize] = &[454, 323, 361, 288, 397, 365, 379, 378, 400, 377, 152];

/// Jaw contour from the right ear down to the chin.
pub const RIGHT_JAW: &[usize] = &[234, 93, 132, 58, 172, 136, 150, 149, 176, 148, 152];

pub const LEFT_CHEEK: &[usize] = &[266, 426, 436, 416, 376, 352, 346, 347, 330];

pub const RIGHT_CHEEK: &[usize] = &[36, 206, 216, 192, 147, 123, 117, 118, 101];

/// Landmarks expected per face.
pub const LANDMARK_COUNT: usize = 468;

/// A named facial region drawn into the masks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MaskRegion {
    Skin,
    Eyes,
    Jaw,
    Cheeks,
    Lips,
    Nose,
}

impl MaskRegion {
    pub const ALL: [MaskRegion; 6] = [
        Self::Skin,
        Self::Eyes,
        Self::Jaw,
        Self::Cheeks,
        Self::Lips,
        Self::Nose,
    ];

    /// Landmark index groups making up this region.
    pub fn contours(self) -> &'static [&'static [usize]] {
        match self {
            Self::Skin => &[FACE_OVAL],
            Self::Eyes => &[LEFT_EYE, RIGHT_EYE],
            Self::Jaw => &[LEFT_JAW, RIGHT_JAW],
            Self::Cheeks => &[LEFT_CHEEK, RIGHT_CHEEK],
            Self::Lips => &[LIPS],
            Self::Nose => &[NOSE],
        }
    }

    /// Whether the contours are filled polygons or open strokes.
    pub fn shape(self) -> RegionShape {
        match self {
            Self::Jaw => RegionShape::Stroke,
            _ => RegionShape::Fill,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionShape {
    Fill,
    Stroke,
}

/// Which of the two mask surfaces a region lands in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MaskSurfaceId {
    Primary,
    Secondary,
}

impl MaskSurfaceId {
    pub const fn index(self) -> usize {
        match self {
            Self::Primary => 0,
            Self::Secondary => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    R,
    G,
    B,
}

impl Channel {
    pub const fn index(self) -> usize {
        match self {
            Self::R => 0,
            Self::G => 1,
            Self::B => 2,
        }
    }
}

/// Region to `(surface, channel)` packing read by the composite shader.
///
/// Primary: skin→R, eyes→G, jaw→B. Secondary: cheeks→R, lips→G, nose→B.
pub const CHANNEL_MAP: [(MaskRegion, MaskSurfaceId, Channel); 6] = [
    (MaskRegion::Skin, MaskSurfaceId::Primary, Channel::R),
    (MaskRegion::Eyes, MaskSurfaceId::Primary, Channel::G),
    (MaskRegion::Jaw, MaskSurfaceId::Primary, Channel::B),
    (MaskRegion::Cheeks, MaskSurfaceId::Secondary, Channel::R),
    (MaskRegion::Lips, MaskSurfaceId::Secondary, Channel::G),
    (MaskRegion::Nose, MaskSurfaceId::Secondary, Channel::B),
];

/// Errors found in a channel map.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ChannelMapError {
    #[error("{0:?} appears more than once")]
    DuplicateRegion(MaskRegion),
    #[error("{0:?} has no channel")]
    MissingRegion(MaskRegion),
    #[error("{first:?} and {second:?} share {surface:?}.{channel:?}")]
    SharedChannel {
        first: MaskRegion,
        second: MaskRegion,
        surface: MaskSurfaceId,
        channel: Channel,
    },
}

/// Check that every region has exactly one slot and no slot is shared.
pub fn validate_channel_map(
    map: &[(MaskRegion, MaskSurfaceId, Channel)],
) -> Result<(), ChannelMapError> {
    for (i, (region, surface, channel)) in map.iter().enumerate() {
        for (other, other_surface, other_channel) in &map[..i] {
            if other == region {
                return Err(ChannelMapError::DuplicateRegion(*region));
            }
            if other_surface == surface && other_channel == channel {
                return Err(ChannelMapError::SharedChannel {
                    first: *other,
                    second: *region,
                    surface: *surface,
                    channel: *channel,
                });
            }
        }
    }
    for region in MaskRegion::ALL {
        if !map.iter().any(|(r, _, _)| *r == region) {
            return Err(ChannelMapError::MissingRegion(region));
        }
    }
    Ok(())
}

/// Slot assigned to `region` in [`CHANNEL_MAP`].
pub fn slot_of(region: MaskRegion) -> (MaskSurfaceId, Channel) {
    match region {
        MaskRegion::Skin => (MaskSurfaceId::Primary, Channel::R),
        MaskRegion::Eyes => (MaskSurfaceId::Primary, Channel::G),
        MaskRegion::Jaw => (MaskSurfaceId::Primary, Channel::B),
        MaskRegion::Cheeks => (MaskSurfaceId::Secondary, Channel::R),
        MaskRegion::Lips => (MaskSurfaceId::Secondary, Channel::G),
        MaskRegion::Nose => (MaskSurfaceId::Secondary, Channel::B),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_channel_map_is_valid() {
        assert_eq!(validate_channel_map(&CHANNEL_MAP), Ok(()));
    }

    #[test]
    fn test_slot_of_agrees_with_map() {
        for (region, surface, channel) in CHANNEL_MAP {
            assert_eq!(slot_of(region), (surface, channel));
        }
    }

    #[test]
    fn test_shared_channel_is_rejected() {
        let mut map = CHANNEL_MAP;
        map[1].2 = Channel::R;
        assert!(matches!(
            validate_channel_map(&map),
            Err(ChannelMapError::SharedChannel { .. })
        ));
    }

    #[test]
    fn test_missing_region_is_rejected() {
        assert_eq!(
            validate_channel_map(&CHANNEL_MAP[..5]),
            Err(ChannelMapError::MissingRegion(MaskRegion::Nose))
        );
    }

    #[test]
    fn test_indices_fit_face_mesh() {
        for region in MaskRegion::ALL {
            for contour in region.contours() {
                assert!(contour.iter().all(|i| *i < LANDMARK_COUNT));
            }
        }
    }
}

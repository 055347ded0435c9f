//! Image geometry needed to bound decoded image streams.

use crate::object::{Dict, Object, Resolver};

/// Maximum colour space nesting followed when counting components.
const MAX_COLOUR_SPACE_DEPTH: usize = 8;

/// Sample layout of an image XObject.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageInfo {
    /// `/Width` in samples
    pub width: usize,
    /// `/Height` in rows
    pub height: usize,
    /// Colour components per sample
    pub components: usize,
    /// Bits per component
    pub bits_per_component: usize,
}

impl ImageInfo {
    /// Bytes per packed row (rows are padded to a byte boundary).
    ///
    /// `None` when the row size does not fit in `usize`.
    pub fn row_bytes(&self) -> Option<usize> {
        self.width
            .checked_mul(self.components)?
            .checked_mul(self.bits_per_component)
            .map(|bits| bits.div_ceil(8))
    }

    /// Total bytes of sample data, `None` on overflow.
    pub fn data_bytes(&self) -> Option<usize> {
        self.row_bytes()?.checked_mul(self.height)
    }
}

/// Describe the image a stream dictionary declares, if it is one.
///
/// `is_bitmap` forces 1 component at 1 bit (fax and JBIG2 data).
/// `colors_hint` is the `/Colors` value of the decode parameters, which
/// takes precedence over the colour space.
pub fn image_info(
    dict: &Dict,
    resolver: &dyn Resolver,
    is_bitmap: bool,
    colors_hint: Option<i64>,
) -> Option<ImageInfo> {
    let get = |key: &str| dict.get(key).map(|v| resolver.resolve(v)).unwrap_or_default();

    if get("Subtype").as_name() != Some("Image") {
        return None;
    }
    let width = usize::try_from(get("Width").to_i64()?).ok()?;
    let height = usize::try_from(get("Height").to_i64()?).ok()?;

    let is_mask = get("ImageMask").as_bool().unwrap_or(false);
    let (components, bits_per_component) = if is_bitmap || is_mask {
        (1, 1)
    } else {
        let bpc = usize::try_from(get("BitsPerComponent").to_i64()?).ok()?;
        let components = match colors_hint {
            Some(c) if c > 0 => c as usize,
            _ => colour_components(&get("ColorSpace"), resolver)?,
        };
        (components, bpc)
    };
    if components == 0 {
        return None;
    }

    Some(ImageInfo {
        width,
        height,
        components,
        bits_per_component,
    })
}

/// Number of colour components per sample in a colour space.
///
/// Returns `None` for unknown or unresolvable spaces.
pub fn colour_components(space: &Object, resolver: &dyn Resolver) -> Option<usize> {
    components_at_depth(space, resolver, 0)
}

fn components_at_depth(space: &Object, resolver: &dyn Resolver, depth: usize) -> Option<usize> {
    if depth > MAX_COLOUR_SPACE_DEPTH {
        return None;
    }
    let space = resolver.resolve(space);
    if let Some(name) = space.as_name() {
        return match name {
            "DeviceGray" | "G" | "CalGray" => Some(1),
            "DeviceRGB" | "RGB" | "CalRGB" | "Lab" => Some(3),
            "DeviceCMYK" | "CMYK" => Some(4),
            _ => None,
        };
    }

    let family = space.index_resolved(0, resolver);
    match family.as_name()? {
        "CalGray" => Some(1),
        "CalRGB" | "Lab" => Some(3),
        "ICCBased" => {
            let profile = space.index_resolved(1, resolver);
            match profile.get("Alternate") {
                Some(alt) => components_at_depth(alt, resolver, depth + 1),
                None => profile
                    .get_resolved("N", resolver)
                    .to_i64()
                    .and_then(|n| usize::try_from(n).ok()),
            }
        },
        // one index or tint per sample, whatever the base space is
        "Indexed" | "I" | "Separation" => Some(1),
        "DeviceN" => space
            .index_resolved(1, resolver)
            .as_array()
            .map(|names| names.len()),
        _ => None,
    }
}

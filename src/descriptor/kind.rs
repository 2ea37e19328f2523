use std::fmt;

use super::language::Language;
use super::params::TileDescriptor;

/// Size variant of a bitmap icon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BitmapSize {
    /// Tag `B`
    Normal,
    /// Tag `Q`
    Large,
    /// Tag `q`
    Small,
}

impl BitmapSize {
    pub fn tag(self) -> char {
        match self {
            BitmapSize::Normal => 'B',
            BitmapSize::Large => 'Q',
            BitmapSize::Small => 'q',
        }
    }
}

/// Everything a client can ask for that is not a geometry or string tile.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResourceDescriptor {
    /// Icon bitmap, e.g. `Bpoi_fuel`
    Bitmap { size: BitmapSize, name: String },

    /// Map format descriptor for a language, `D` (day) or `d` (night)
    FormatDesc {
        language: Language,
        night: bool,
        server_prefix: Option<u32>,
    },

    /// Checksum of the matching format descriptor, `C` or `c`
    FormatDescChecksum {
        language: Language,
        night: bool,
        server_prefix: Option<u32>,
    },

    /// Multi-buffer container key (`N...`); used as the cache namespace
    Container(String),
}

impl ResourceDescriptor {
    /// The format descriptor a checksum resource is computed from.
    pub fn checksum_source(&self) -> Option<ResourceDescriptor> {
        match self {
            ResourceDescriptor::FormatDescChecksum {
                language,
                night,
                server_prefix,
            } => Some(ResourceDescriptor::FormatDesc {
                language: *language,
                night: *night,
                server_prefix: *server_prefix,
            }),
            _ => None,
        }
    }

    fn parse(text: &str) -> Option<ResourceDescriptor> {
        let tag = text.chars().next()?;
        let rest = &text[tag.len_utf8()..];
        let resource = match tag {
            'B' | 'Q' | 'q' => {
                let size = match tag {
                    'B' => BitmapSize::Normal,
                    'Q' => BitmapSize::Large,
                    _ => BitmapSize::Small,
                };
                let valid = !rest.is_empty()
                    && rest
                        .bytes()
                        .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-');
                if !valid {
                    return None;
                }
                ResourceDescriptor::Bitmap {
                    size,
                    name: rest.to_string(),
                }
            }
            'D' | 'd' | 'C' | 'c' => {
                let (lang, prefix) = match rest.split_once('_') {
                    Some((lang, prefix)) => (lang, Some(prefix.parse().ok()?)),
                    None => (rest, None),
                };
                let language = Language::from_code(lang)?;
                let night = tag.is_ascii_lowercase();
                if tag.eq_ignore_ascii_case(&'D') {
                    ResourceDescriptor::FormatDesc {
                        language,
                        night,
                        server_prefix: prefix,
                    }
                } else {
                    ResourceDescriptor::FormatDescChecksum {
                        language,
                        night,
                        server_prefix: prefix,
                    }
                }
            }
            'N' if !rest.is_empty() => ResourceDescriptor::Container(rest.to_string()),
            _ => return None,
        };
        (resource.to_string() == text).then_some(resource)
    }
}

impl fmt::Display for ResourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (tag, language, server_prefix) = match self {
            ResourceDescriptor::Bitmap { size, name } => {
                return write!(f, "{}{}", size.tag(), name);
            }
            ResourceDescriptor::Container(inner) => return write!(f, "N{}", inner),
            ResourceDescriptor::FormatDesc {
                language,
                night,
                server_prefix,
            } => (if *night { 'd' } else { 'D' }, language, server_prefix),
            ResourceDescriptor::FormatDescChecksum {
                language,
                night,
                server_prefix,
            } => (if *night { 'c' } else { 'C' }, language, server_prefix),
        };
        write!(f, "{}{}", tag, language)?;
        if let Some(prefix) = server_prefix {
            write!(f, "_{}", prefix)?;
        }
        Ok(())
    }
}

// =============================================================================
// Descriptor
// =============================================================================

/// Result of parsing any client descriptor. Parsing never fails; text that
/// is not in canonical form becomes [`Descriptor::Invalid`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Descriptor {
    Tile(TileDescriptor),
    Resource(ResourceDescriptor),
    Invalid(String),
}

impl Descriptor {
    pub fn parse(text: &str) -> Descriptor {
        match text.chars().next() {
            Some('G' | 'T') => TileDescriptor::parse(text).map(Descriptor::Tile),
            Some(_) => ResourceDescriptor::parse(text).map(Descriptor::Resource),
            None => None,
        }
        .unwrap_or_else(|| Descriptor::Invalid(text.to_string()))
    }

    pub fn is_valid(&self) -> bool {
        !matches!(self, Descriptor::Invalid(_))
    }
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Descriptor::Tile(tile) => tile.fmt(f),
            Descriptor::Resource(resource) => resource.fmt(f),
            Descriptor::Invalid(text) => f.write_str(text),
        }
    }
}

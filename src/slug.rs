//! # Identifier Resolver Module
//!
//! Derives a URL-safe, human-readable, collision-free identifier for a
//! listing from its title. The resolved slug doubles as the storage-key
//! namespace for the listing's images, so the lifecycle layer consults it
//! whenever a title edit changes the public identifier.

use crate::error::PipelineError;
use crate::store::{ListingId, MetadataStore};

/// Maximum slug length; truncation happens on a hyphen boundary
pub const MAX_SLUG_LEN: usize = 60;

/// Retry bound for collision suffixes before failing loudly
const MAX_SUFFIX_ATTEMPTS: u32 = 1000;

/// Slug used when a title contains no usable characters at all
const FALLBACK_SLUG: &str = "untitled";

/// Derive a slug candidate from a listing title.
///
/// Lowercases, transliterates common accented Latin characters, drops
/// other non-alphanumerics, collapses separator runs to single hyphens,
/// trims edge hyphens and truncates to [`MAX_SLUG_LEN`] on a hyphen
/// boundary (never mid-word if avoidable).
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_separator = false;

    for raw in title.chars() {
        let c = raw.to_lowercase().next().unwrap_or(raw);
        if c.is_ascii_alphanumeric() {
            if pending_separator && !slug.is_empty() {
                slug.push('-');
            }
            pending_separator = false;
            slug.push(c);
        } else if let Some(folded) = transliterate(c) {
            if pending_separator && !slug.is_empty() {
                slug.push('-');
            }
            pending_separator = false;
            slug.push_str(folded);
        } else if c.is_whitespace() || c == '-' || c == '_' {
            pending_separator = true;
        }
        // any other character is dropped without becoming a separator
    }

    let mut slug = truncate_on_hyphen(&slug, MAX_SLUG_LEN);
    if slug.is_empty() {
        slug = FALLBACK_SLUG.to_string();
    }
    slug
}

/// Check a candidate against the persisted store, appending incrementing
/// numeric suffixes until a free slug is found.
///
/// When editing an existing listing, pass its id as `exclude` so the
/// resolver does not detect a false collision against the entity itself.
/// Fails with [`PipelineError::SlugExhausted`] after the retry bound
/// instead of looping forever.
pub async fn ensure_unique(
    store: &dyn MetadataStore,
    candidate: &str,
    exclude: Option<ListingId>,
) -> Result<String, PipelineError> {
    for attempt in 0..MAX_SUFFIX_ATTEMPTS {
        let slug = if attempt == 0 {
            candidate.to_string()
        } else {
            suffixed(candidate, attempt)
        };

        if !store.slug_exists(&slug, exclude).await? {
            return Ok(slug);
        }
    }

    Err(PipelineError::SlugExhausted {
        candidate: candidate.to_string(),
        attempts: MAX_SUFFIX_ATTEMPTS,
    })
}

/// Append `-n`, trimming the base so the result stays within the length cap
fn suffixed(base: &str, n: u32) -> String {
    let suffix = format!("-{n}");
    let budget = MAX_SLUG_LEN.saturating_sub(suffix.len());
    let trimmed = if base.len() > budget {
        base[..budget].trim_end_matches('-')
    } else {
        base
    };
    format!("{trimmed}{suffix}")
}

/// Cut at the last hyphen at or before `max`, falling back to a hard cut
/// when the slug has no usable hyphen
fn truncate_on_hyphen(slug: &str, max: usize) -> String {
    if slug.len() <= max {
        return slug.trim_matches('-').to_string();
    }

    // slugs are pure ASCII at this point, byte indexing is safe
    let head = &slug[..max];
    match head.rfind('-') {
        Some(cut) if cut > 0 => head[..cut].trim_matches('-').to_string(),
        _ => head.trim_matches('-').to_string(),
    }
}

/// ASCII folding for the accented Latin characters common in listing titles
fn transliterate(c: char) -> Option<&'static str> {
    let folded = match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'ā' | 'ă' | 'ą' => "a",
        'è' | 'é' | 'ê' | 'ë' | 'ē' | 'ė' | 'ę' | 'ě' => "e",
        'ì' | 'í' | 'î' | 'ï' | 'ī' | 'į' => "i",
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' | 'ō' | 'ő' => "o",
        'ù' | 'ú' | 'û' | 'ü' | 'ū' | 'ů' | 'ű' => "u",
        'ý' | 'ÿ' => "y",
        'ç' | 'ć' | 'č' => "c",
        'ñ' | 'ń' | 'ň' => "n",
        'š' | 'ś' => "s",
        'ž' | 'ź' | 'ż' => "z",
        'ď' => "d",
        'ť' => "t",
        'ř' => "r",
        'ł' => "l",
        'đ' => "dj",
        'ß' => "ss",
        'æ' => "ae",
        'œ' => "oe",
        'þ' => "th",
        'ð' => "d",
        _ => return None,
    };
    Some(folded)
}

//! Resolves a navigator [`IconType`](crate::navigator::IconType) to an
//! actual glyph, according to the configured [`IconSet`].

use crate::config::IconSet;
use crate::navigator::IconType;

pub fn glyph(icon: IconType, set: IconSet) -> &'static str {
    match (set, icon) {
        (IconSet::None, _) => "",
        (IconSet::Unicode, IconType::Folder) => "\u{1F4C1} ",
        (IconSet::Unicode, IconType::Artist) => "\u{1F3A4} ",
        (IconSet::Unicode, IconType::Album) => "\u{1F4BF} ",
        (IconSet::Unicode, IconType::Track) => "\u{1F3B5} ",
        (IconSet::Unicode, IconType::File) => "\u{1F4C4} ",
        (IconSet::Unicode, IconType::Download) => "\u{2B07} ",
        (IconSet::Nerd, IconType::Folder) => "\u{f07b} ",
        (IconSet::Nerd, IconType::Artist) => "\u{f001} ",
        (IconSet::Nerd, IconType::Album) => "\u{f09e4} ",
        (IconSet::Nerd, IconType::Track) => "\u{f001} ",
        (IconSet::Nerd, IconType::File) => "\u{f0224} ",
        (IconSet::Nerd, IconType::Download) => "\u{f019} ",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_icon_set_renders_nothing() {
        assert_eq!(glyph(IconType::Album, IconSet::None), "");
    }

    #[test]
    fn unicode_and_nerd_sets_render_distinct_non_empty_glyphs() {
        let unicode = glyph(IconType::Track, IconSet::Unicode);
        let nerd = glyph(IconType::Track, IconSet::Nerd);
        assert!(!unicode.is_empty());
        assert!(!nerd.is_empty());
        assert_ne!(unicode, nerd);
    }
}

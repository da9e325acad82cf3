//! Generated C header synthesis.
//!
//! Two kinds of headers are produced:
//!
//! - A companion header for raw bitmap output. The bitmap compiler only
//!   prints array definitions, so every `const unsigned {char|short}`
//!   array it emits gets a `<name>Len` constant and an `extern` declaration.
//! - An animation header with one pointer per named frame, offset from the
//!   sheet's tile data by a fixed stride.
//!
//! Generated text carries no timestamps, so rebuilding unchanged inputs
//! produces byte-identical files.

use crate::build::naming::{to_pascal_case, to_screaming_snake_case};
use crate::config::AnimationSpec;
use regex::Regex;
use std::fmt::Write;
use std::sync::OnceLock;

const GENERATED_BANNER: &str = "// Generated by gfxbuild. Do not edit.";

/// `const unsigned {short|char} <name>[<length>]`
const DECLARATION_PATTERN: &str =
    r"const\s+unsigned\s+(short|char)\s+([A-Za-z_]\w*)\s*\[\s*(\d+)\s*\]";

fn declaration_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(DECLARATION_PATTERN).expect("valid declaration pattern")
    })
}

/// Element type of a data array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementType {
    Char,
    Short,
}

impl ElementType {
    fn c_name(self) -> &'static str {
        match self {
            ElementType::Char => "char",
            ElementType::Short => "short",
        }
    }
}

/// An array definition found in compiler output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub element: ElementType,
    pub name: String,
    pub length: u64,
}

impl Declaration {
    /// `const unsigned char fooTiles[128]`
    pub fn signature(&self) -> String {
        format!("const unsigned {} {}[{}]", self.element.c_name(), self.name, self.length)
    }
}

/// Find every array definition in `source`, in order of appearance.
///
/// A symbol defined more than once is reported once.
pub fn parse_declarations(source: &str) -> Vec<Declaration> {
    let mut declarations: Vec<Declaration> = Vec::new();
    for caps in declaration_regex().captures_iter(source) {
        let element = if &caps[1] == "short" { ElementType::Short } else { ElementType::Char };
        let Ok(length) = caps[3].parse() else {
            continue;
        };
        let name = caps[2].to_string();
        if declarations.iter().any(|d| d.name == name) {
            continue;
        }
        declarations.push(Declaration { element, name, length });
    }
    declarations
}

/// Companion header for a raw bitmap group.
///
/// The include guard is the group name in SCREAMING_SNAKE_CASE followed by `_H`.
pub fn data_header(group_name: &str, declarations: &[Declaration]) -> String {
    let guard = format!("{}_H", to_screaming_snake_case(group_name));
    let mut out = String::new();

    let _ = writeln!(out, "{}\n", GENERATED_BANNER);
    let _ = writeln!(out, "#ifndef {}", guard);
    let _ = writeln!(out, "#define {}\n", guard);
    for decl in declarations {
        let _ = writeln!(out, "#define {}Len {}", decl.name, decl.length);
        let _ = writeln!(out, "extern {};\n", decl.signature());
    }
    let _ = writeln!(out, "#endif // {}", guard);

    out
}

/// File name of a group's animation header, e.g. `PlayerFrames.h`.
pub fn animation_header_filename(group_name: &str) -> String {
    format!("{}.h", to_pascal_case(&format!("{} Frames", group_name)))
}

/// Frame lookup header for a group's animations.
///
/// Frame `i` of an animation points `stride * i` bytes past the tile data of
/// the sheet named by its `for` header.
pub fn animation_header(group_name: &str, animations: &[AnimationSpec]) -> Result<String, String> {
    let guard = format!("{}_H", to_screaming_snake_case(&format!("{} Frames", group_name)));
    let mut out = String::new();

    let _ = writeln!(out, "{}\n", GENERATED_BANNER);
    let _ = writeln!(out, "#ifndef {}", guard);
    let _ = writeln!(out, "#define {}\n", guard);
    for anim in animations {
        let _ = writeln!(out, "#include \"{}\"", anim.header_file);
    }
    out.push('\n');

    for anim in animations {
        let stride = anim.parsed_frame_size()?.stride() as u64;
        let base = anim.base_name();
        let prefix = format!("Anime{}", to_pascal_case(base));
        for (i, frame) in anim.frame_names.iter().enumerate() {
            let _ = writeln!(
                out,
                "const unsigned char* {}{} = {}Tiles + {};",
                prefix,
                to_pascal_case(frame),
                base,
                stride * i as u64
            );
        }
        out.push('\n');
    }
    let _ = writeln!(out, "#endif // {}", guard);

    Ok(out)
}

//! Build Test Suite
//!
//! End-to-end tests for the incremental asset build. External compilers are
//! replaced by small shell scripts, so these tests only run on Unix.
//!
//! - Idempotence of repeated builds
//! - Per-group staleness after touching a single source
//! - Descriptor and deleted-file cache invalidation
//! - Intermediate cleanup on success and failure
//! - Header synthesis for raw bitmap output
//! - Serialized compiler invocations across concurrent groups
//! - Descriptors whose sources collide on an intermediate name

#![cfg(unix)]

use std::fs::{self, File};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

use gfxbuild::build::{BuildContext, BuildOutcome, GroupStatus, IncrementalBuild, StalenessCache};
use gfxbuild::cli::{execute_build, BuildOptions};
use gfxbuild::config::{load_build_file, ConfigError, ToolPaths};
use image::{Rgba, RgbaImage};

// ============================================================================
// Test Utilities
// ============================================================================

/// Tile compiler stand-in: logs its arguments, keeps a copy of every
/// intermediate in `seen/` and writes a header/source pair per input.
const FAKE_GRIT: &str = r#"#!/bin/sh
echo "$@" >> grit.log
mkdir -p seen
for f in "$@"; do
  case "$f" in
    -fail) exit 1 ;;
    -*) ;;
    *) cp "$f" seen/; stem="${f%.*}"; echo "// $stem" > "$stem.h"; echo "// $stem" > "$stem.c" ;;
  esac
done
"#;

/// Raw bitmap compiler stand-in. It stages its output in a scratch file in
/// the working directory, so overlapping runs would corrupt each other.
const FAKE_BMP2GBA: &str = r#"#!/bin/sh
echo "$@" >> bmp2gba.log
for f in "$@"; do
  case "$f" in
    -*) ;;
    *)
      stem="${f%.*}"
      set -- $(cksum < "$f")
      echo "const unsigned char ${stem}Bitmap[$2] = { /* $1 */ };" >> scratch.txt
      ;;
  esac
done
sleep 0.05
cat scratch.txt
rm scratch.txt
"#;

struct Project {
    temp: TempDir,
    tools: ToolPaths,
}

impl Project {
    fn new() -> Self {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("assets")).unwrap();
        fs::create_dir_all(temp.path().join("tools")).unwrap();

        let tools = ToolPaths {
            grit: write_script(&temp.path().join("tools/grit"), FAKE_GRIT),
            bmp2gba: write_script(&temp.path().join("tools/bmp2gba"), FAKE_BMP2GBA),
            aseprite: PathBuf::from("/nonexistent/aseprite"),
        };
        Self { temp, tools }
    }

    fn assets(&self) -> PathBuf {
        self.temp.path().join("assets")
    }

    fn out(&self) -> PathBuf {
        self.temp.path().join("out")
    }

    fn descriptor(&self) -> PathBuf {
        self.temp.path().join("build.toml")
    }

    fn write_descriptor(&self, text: &str) {
        fs::write(self.descriptor(), text).unwrap();
    }

    fn write_image(&self, relative: &str, seed: u8) {
        let path = self.assets().join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        let img = RgbaImage::from_fn(8, 8, |x, y| {
            if x == 0 && y == 0 {
                Rgba([10, 20, 30, 0])
            } else {
                Rgba([seed, (x * 30) as u8, (y * 30) as u8, 255])
            }
        });
        img.save(path).unwrap();
    }

    /// One CLI-equivalent build: load, run, and snapshot on success.
    fn build_with(&self, jobs: usize, force: bool) -> BuildOutcome {
        let build_file = load_build_file(&self.descriptor()).unwrap();
        let cache = StalenessCache::load(&self.assets(), &self.descriptor());
        let context = BuildContext::new(self.assets(), self.out())
            .with_tools(self.tools.clone())
            .with_jobs(jobs)
            .with_force(force);

        let outcome = IncrementalBuild::new(context).run(&build_file.graphics, &cache);
        if outcome.first_error.is_none() {
            let snapshot = StalenessCache::snapshot(&self.assets(), &self.descriptor());
            snapshot.save(&self.assets()).unwrap();
        }
        outcome
    }

    fn build(&self) -> BuildOutcome {
        self.build_with(4, false)
    }

    fn log_lines(&self, name: &str) -> usize {
        fs::read_to_string(self.out().join(name)).map(|s| s.lines().count()).unwrap_or(0)
    }
}

fn write_script(path: &Path, body: &str) -> PathBuf {
    fs::write(path, body).unwrap();
    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
    path.to_path_buf()
}

/// Move a file's modification time forward so it differs from any snapshot.
fn touch(path: &Path, secs: u64) {
    let time = SystemTime::now() + Duration::from_secs(secs);
    File::options().write(true).open(path).unwrap().set_modified(time).unwrap();
}

fn intermediates_in(dir: &Path) -> Vec<String> {
    fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|n| n.ends_with(".png") || n.ends_with(".bmp"))
        .collect()
}

const THREE_GROUPS: &str = r#"
[[graphics]]
name = "a"
mode = "grit"
files = ["a/One.png"]

[[graphics]]
name = "b"
mode = "grit"
files = ["b/Two.png", "b/Three.png"]

[[graphics]]
name = "c"
mode = "grit"
files = ["c/Four.png"]
"#;

fn three_group_project() -> Project {
    let project = Project::new();
    project.write_descriptor(THREE_GROUPS);
    for (i, file) in ["a/One.png", "b/Two.png", "b/Three.png", "c/Four.png"].iter().enumerate() {
        project.write_image(file, i as u8 * 40);
    }
    project
}

// ============================================================================
// Incremental Behaviour
// ============================================================================

#[test]
fn test_second_build_skips_everything() {
    let project = three_group_project();

    let first = project.build().into_result().unwrap();
    assert_eq!(first.built_count(), 3);
    assert_eq!(project.log_lines("grit.log"), 3);

    let second = project.build().into_result().unwrap();
    assert_eq!(second.built_count(), 0);
    assert_eq!(second.skipped_count(), 3);
    assert_eq!(project.log_lines("grit.log"), 3, "no conversions on the second run");
}

#[test]
fn test_touching_one_file_rebuilds_only_its_group() {
    let project = three_group_project();
    project.build().into_result().unwrap();

    touch(&project.assets().join("b/Three.png"), 30);
    let result = project.build().into_result().unwrap();

    assert_eq!(result.names_with(&GroupStatus::Built), vec!["b"]);
    assert_eq!(result.names_with(&GroupStatus::Skipped), vec!["a", "c"]);
}

#[test]
fn test_descriptor_change_rebuilds_every_group_once() {
    let project = three_group_project();
    project.build().into_result().unwrap();

    touch(&project.descriptor(), 30);
    let result = project.build().into_result().unwrap();
    assert_eq!(result.built_count(), 3);

    let again = project.build().into_result().unwrap();
    assert_eq!(again.skipped_count(), 3);
}

#[test]
fn test_new_unreferenced_file_does_not_rebuild() {
    let project = three_group_project();
    project.build().into_result().unwrap();

    project.write_image("unused/Extra.png", 1);
    let result = project.build().into_result().unwrap();
    assert_eq!(result.built_count(), 0);
}

#[test]
fn test_deleted_file_invalidates_cache() {
    let project = three_group_project();
    project.write_image("unused/Extra.png", 1);
    project.build().into_result().unwrap();

    fs::remove_file(project.assets().join("unused/Extra.png")).unwrap();
    let result = project.build().into_result().unwrap();
    assert_eq!(result.built_count(), 3);
}

#[test]
fn test_failed_group_is_retried_next_run() {
    let project = three_group_project();
    project.build().into_result().unwrap();

    fs::write(project.assets().join("a/One.png"), b"not a png").unwrap();
    touch(&project.assets().join("a/One.png"), 30);
    let failed = project.build();
    assert!(failed.first_error.is_some());
    assert_eq!(failed.result.names_with(&GroupStatus::Skipped), vec!["b", "c"]);

    // The failed run did not snapshot, so the broken group is still stale
    let again = project.build();
    assert!(again.first_error.is_some());
    assert_eq!(again.result.failed_count(), 1);
    assert_eq!(again.result.skipped_count(), 2);
}

#[test]
fn test_symlinked_source_is_not_rebuilt() {
    let project = Project::new();
    project.write_descriptor(
        "[[graphics]]\nname = \"hero\"\nmode = \"grit\"\n\
         files = [\"Hero.png\", \"shared/Real.png\"]\n",
    );
    let real_dir = project.temp.path().join("real");
    fs::create_dir_all(&real_dir).unwrap();
    RgbaImage::from_pixel(8, 8, Rgba([80, 40, 20, 255])).save(real_dir.join("Real.png")).unwrap();
    std::os::unix::fs::symlink(real_dir.join("Real.png"), project.assets().join("Hero.png"))
        .unwrap();
    std::os::unix::fs::symlink(&real_dir, project.assets().join("shared")).unwrap();

    assert_eq!(project.build().into_result().unwrap().built_count(), 1);
    assert_eq!(project.build().into_result().unwrap().skipped_count(), 1);

    touch(&real_dir.join("Real.png"), 30);
    assert_eq!(project.build().into_result().unwrap().built_count(), 1);
}

// ============================================================================
// Pipeline Output
// ============================================================================

#[test]
fn test_intermediates_are_quantized_and_ordered() {
    let project = three_group_project();
    project.build().into_result().unwrap();

    let log = fs::read_to_string(project.out().join("grit.log")).unwrap();
    assert!(log.lines().any(|l| l == "BTwo.png BThree.png"));

    let seen = image::open(project.out().join("seen/BTwo.png")).unwrap().to_rgba8();
    // Fully transparent pixel becomes the key color
    assert_eq!(seen.get_pixel(0, 0), &Rgba([248, 0, 240, 255]));
    // Every channel is a multiple of 8
    assert!(seen.pixels().all(|p| p[0] % 8 == 0 && p[1] % 8 == 0 && p[2] % 8 == 0));
}

#[test]
fn test_no_intermediates_after_success() {
    let project = three_group_project();
    project.build().into_result().unwrap();

    assert!(intermediates_in(&project.out()).is_empty());
    assert!(project.out().join("AOne.h").exists());
    assert!(project.out().join("BThree.c").exists());
}

#[test]
fn test_no_intermediates_after_failure() {
    let project = Project::new();
    project.write_descriptor(
        r#"
[[graphics]]
name = "broken"
mode = "grit"
files = ["ok/One.png", "bad/Two.png"]

[[graphics]]
name = "raw"
mode = "bmp2gba"
files = ["raw/Three.png", "raw/missing-kind.gif"]
"#,
    );
    project.write_image("ok/One.png", 1);
    fs::create_dir_all(project.assets().join("bad")).unwrap();
    fs::write(project.assets().join("bad/Two.png"), b"not a png").unwrap();
    project.write_image("raw/Three.png", 2);
    fs::write(project.assets().join("raw/missing-kind.gif"), b"GIF89a").unwrap();

    let outcome = project.build();
    assert!(outcome.first_error.is_some());
    assert_eq!(outcome.result.failed_count(), 2);
    assert!(intermediates_in(&project.out()).is_empty());
    assert_eq!(project.log_lines("grit.log"), 0);
    assert_eq!(project.log_lines("bmp2gba.log"), 0);
}

#[test]
fn test_raw_bitmap_header_declares_every_array() {
    let project = Project::new();
    project.write_descriptor(
        "[[graphics]]\nname = \"title\"\nmode = \"bmp2gba\"\n\
         files = [\"Title.png\", \"Logo.png\"]\n",
    );
    project.write_image("Title.png", 1);
    project.write_image("Logo.png", 2);

    project.build().into_result().unwrap();

    let source = fs::read_to_string(project.out().join("title.c")).unwrap();
    let header = fs::read_to_string(project.out().join("title.h")).unwrap();
    assert_eq!(source.lines().count(), 2);
    for name in ["TitleBitmap", "LogoBitmap"] {
        assert!(header.contains(&format!("#define {}Len ", name)), "{}", header);
        assert!(header.contains(&format!("extern const unsigned char {}[", name)), "{}", header);
    }
    assert!(header.starts_with("// Generated by gfxbuild"));
    assert!(header.contains("#ifndef TITLE_H"));
}

#[test]
fn test_animation_header_after_compile() {
    let project = Project::new();
    project.write_descriptor(
        r#"
[[graphics]]
name = "hero"
mode = "grit"
files = ["Hero.png"]

[[graphics.animes]]
for = "Hero.h"
size = "16x32"
frames = ["stand", "jump"]
"#,
    );
    project.write_image("Hero.png", 1);

    project.build().into_result().unwrap();

    let header = fs::read_to_string(project.out().join("HeroFrames.h")).unwrap();
    assert!(header.contains("#ifndef HERO_FRAMES_H"));
    assert!(header.contains("#include \"Hero.h\""));
    assert!(header.contains("const unsigned char* AnimeHeroStand = HeroTiles + 0;"));
    assert!(header.contains("const unsigned char* AnimeHeroJump = HeroTiles + 128;"));
}

#[test]
fn test_rebuild_output_is_byte_identical() {
    let project = Project::new();
    project
        .write_descriptor("[[graphics]]\nname = \"t\"\nmode = \"bmp2gba\"\nfiles = [\"T.png\"]\n");
    project.write_image("T.png", 7);

    project.build().into_result().unwrap();
    let first = fs::read(project.out().join("t.h")).unwrap();

    project.build_with(1, true).into_result().unwrap();
    assert_eq!(fs::read(project.out().join("t.h")).unwrap(), first);
}

// ============================================================================
// Concurrency
// ============================================================================

fn raw_groups_descriptor(n: usize) -> String {
    (0..n)
        .map(|i| {
            format!(
                "[[graphics]]\nname = \"raw{i}\"\nmode = \"bmp2gba\"\n\
                 files = [\"g{i}/A.png\", \"g{i}/B.png\"]\n\n"
            )
        })
        .collect()
}

fn raw_groups_project(n: usize) -> Project {
    let project = Project::new();
    project.write_descriptor(&raw_groups_descriptor(n));
    for i in 0..n {
        project.write_image(&format!("g{}/A.png", i), i as u8 * 10);
        project.write_image(&format!("g{}/B.png", i), i as u8 * 10 + 5);
    }
    project
}

#[test]
fn test_concurrent_raw_groups_match_sequential_output() {
    const GROUPS: usize = 4;

    let sequential = raw_groups_project(GROUPS);
    sequential.build_with(1, false).into_result().unwrap();

    let concurrent = raw_groups_project(GROUPS);
    let result = concurrent.build_with(GROUPS, false).into_result().unwrap();
    assert_eq!(result.built_count(), GROUPS);

    for i in 0..GROUPS {
        for ext in ["c", "h"] {
            let name = format!("raw{}.{}", i, ext);
            let expected = fs::read(sequential.out().join(&name)).unwrap();
            let actual = fs::read(concurrent.out().join(&name)).unwrap();
            assert_eq!(actual, expected, "{} differs", name);
        }
    }
    assert!(!concurrent.out().join("scratch.txt").exists());
}

// ============================================================================
// Descriptor Validation
// ============================================================================

fn cli_options(project: &Project) -> BuildOptions {
    BuildOptions {
        out: project.out(),
        build_file: project.descriptor(),
        assets: project.assets(),
        make_dir: project.temp.path().to_path_buf(),
        make_args: vec![],
        make_program: PathBuf::from("/nonexistent/make"),
        tools: project.tools.clone(),
        force: false,
        no_make: true,
        jobs: Some(2),
        tool_timeout: Duration::from_secs(30),
    }
}

fn assert_rejected_before_conversion(project: &Project, expected: &str) {
    match load_build_file(&project.descriptor()) {
        Err(ConfigError::Validation(errors)) => {
            assert!(errors.iter().any(|e| e.contains(expected)), "{:?}", errors);
        }
        other => panic!("expected validation error, got {:?}", other),
    }

    assert_eq!(execute_build(&cli_options(project)), 1);
    assert_eq!(project.log_lines("grit.log"), 0);
    assert!(!StalenessCache::path_for(&project.assets()).exists());
}

#[test]
fn test_source_shared_between_groups_is_rejected() {
    let project = Project::new();
    project.write_descriptor(
        r#"
[[graphics]]
name = "a"
mode = "grit"
files = ["Shared.png"]

[[graphics]]
name = "b"
mode = "grit"
files = ["Shared.png"]
"#,
    );
    project.write_image("Shared.png", 3);

    assert_rejected_before_conversion(&project, "'Shared.png'");
}

#[test]
fn test_sources_colliding_within_group_are_rejected() {
    let project = Project::new();
    project.write_descriptor(
        "[[graphics]]\nname = \"g\"\nmode = \"grit\"\nfiles = [\"x/a.png\", \"xA.png\"]\n",
    );
    project.write_image("x/a.png", 1);
    project.write_image("xA.png", 2);

    assert_rejected_before_conversion(&project, "'XA.png'");
}

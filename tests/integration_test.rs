use std::path::Path;

use hwelab::file_reader::MockFileReader;
use hwelab::report::Severity;
use hwelab::{build_project, BuildOptions};

fn opts<'a>(top_file: &'a Path, top_name: &'a str) -> BuildOptions<'a> {
    BuildOptions::new(top_file, top_name)
}

#[test]
fn preprocessor_define_arithmetic_substitutes_into_an_attribute() {
    let mut reader = MockFileReader::default();
    reader.add_file(
        "top.hw",
        "#define VAL_1 3\n#define VAL_2 5\n#define VAL_3 (VAL_1 * VAL_2)\n\
         mod Top { options: [NO_CLK_RST] }\n\
         def result { value: <VAL_3> }\n",
    );
    let top_file = Path::new("top.hw");
    let outcome = build_project(&opts(top_file, "Top"), &reader).unwrap();
    let project = outcome.project.unwrap();
    let result = project.defines.values().find(|d| d.name == "result").unwrap();
    assert_eq!(result.value, 15);
}

#[test]
fn preprocessor_for_loop_expands_each_iteration() {
    let mut reader = MockFileReader::default();
    reader.add_file(
        "top.hw",
        "#define MAX 3\n#for i in range(MAX)\nv=$(i*2)\n#endfor\n",
    );
    let top_file = Path::new("top.hw");
    let result = hwelab::preprocessor::preprocess(top_file, &[], &Default::default(), &reader).unwrap();
    assert_eq!(result.lines, vec!["v=0", "v=2", "v=4"]);
}

#[test]
fn include_is_inlined_and_recorded_as_a_dependency() {
    let mut reader = MockFileReader::default();
    reader.add_file("child.hw", "def Child { value: 1 }\n");
    reader.add_file("top.hw", "#include \"child.hw\"\nmod Top { options: [NO_CLK_RST] }\n");
    let top_file = Path::new("top.hw");
    let outcome = build_project(&opts(top_file, "Top"), &reader).unwrap();
    assert!(outcome.project.is_some());
    assert!(outcome.deps.paths().iter().any(|p| p.to_string_lossy().contains("child.hw")));
}

#[test]
fn register_overlap_in_byte_mode_is_surfaced_as_a_validation_error() {
    let mut reader = MockFileReader::default();
    reader.add_file(
        "top.hw",
        "mod Top { options: [NO_CLK_RST] }\n\
         group G { options: [BYTE] reg a { addr: 0x0, width: 32 } reg b { addr: 0x2, width: 32 } }\n",
    );
    let top_file = Path::new("top.hw");
    let outcome = build_project(&opts(top_file, "Top"), &reader).unwrap();
    assert!(outcome.project.is_none());
}

#[test]
fn explicit_connect_fans_a_single_source_out_to_two_module_instances() {
    let mut reader = MockFileReader::default();
    reader.add_file(
        "top.hw",
        "his bus { port p { width: 8, count: 1, role: master } }\n\
         mod Leaf { options: [NO_CLK_RST] ports { hisref p { type: bus, count: 1, role: slave } } }\n\
         mod Top {\n\
           options: [NO_CLK_RST]\n\
           ports { hisref src { type: bus, count: 1, role: master } }\n\
           modules { modinst a { type: Leaf, count: 1 } modinst b { type: Leaf, count: 1 } }\n\
           connections {\n\
             connect c { point s { port: src } point pa { port: p, module: a } point pb { port: p, module: b } }\n\
           }\n\
         }\n",
    );
    let top_file = Path::new("top.hw");
    let outcome = build_project(&opts(top_file, "Top"), &reader).unwrap();
    assert!(outcome.project.is_some());
}

#[test]
fn aperture_reachability_check_raises_no_false_positive_without_an_address_map() {
    let mut reader = MockFileReader::default();
    reader.add_file(
        "top.hw",
        "mod Top { options: [NO_CLK_RST] }\n\
         group scratch { options: [BYTE] reg scratch_0 { addr: 0x1C, width: 32 } reg scratch_1 { addr: 0x40, width: 32 } }\n",
    );
    let top_file = Path::new("top.hw");
    let outcome = build_project(&opts(top_file, "Top"), &reader).unwrap();
    let project = outcome.project.expect("non-overlapping registers elaborate cleanly");
    assert_eq!(project.blocks[&project.block_by_name["Top"]].register_groups[0].registers.len(), 2);
    assert!(outcome.violations.is_empty());
}

#[test]
fn undefined_top_module_is_a_fatal_error() {
    let mut reader = MockFileReader::default();
    reader.add_file("top.hw", "mod Other { options: [NO_CLK_RST] }\n");
    let top_file = Path::new("top.hw");
    let result = build_project(&opts(top_file, "Top"), &reader);
    assert!(result.is_err());
}

#[test]
fn quiet_profiled_build_still_returns_a_usable_project() {
    let mut reader = MockFileReader::default();
    reader.add_file("top.hw", "mod Top { options: [NO_CLK_RST] }\n");
    let top_file = Path::new("top.hw");
    let mut build_opts = opts(top_file, "Top");
    build_opts.quiet = true;
    build_opts.profile = true;
    let outcome = build_project(&build_opts, &reader).unwrap();
    let project = outcome.project.unwrap();
    assert!(!project.blocks.is_empty());
    assert_eq!(outcome.report.entries().iter().filter(|d| d.severity == Severity::Error).count(), 0);
}

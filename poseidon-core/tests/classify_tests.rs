//! Classifier table tests.
//!
//! Each `#[case]` is isolated — no shared state.

use std::path::Path;

use poseidon_core::{classify, split_path, Classification, SemanticType};
use rstest::rstest;

#[rstest]
#[case("a.js", SemanticType::Script)]
#[case("src/lib/worker.mjs", SemanticType::Script)]
#[case("data/level.json", SemanticType::Json)]
#[case("shaders/water.glsl", SemanticType::Shader)]
#[case("shaders/water.vert", SemanticType::Shader)]
#[case("shaders/water.frag", SemanticType::Shader)]
#[case("notes/readme.txt", SemanticType::Text)]
#[case("ui/panel.html", SemanticType::Html)]
#[case("ui/legacy.htm", SemanticType::Html)]
#[case("ui/panel.css", SemanticType::Css)]
#[case("SRC/MAIN.JS", SemanticType::Script)]
fn allowed_extensions_map_to_semantic_type(#[case] path: &str, #[case] expected: SemanticType) {
    assert_eq!(
        classify(Path::new(path)),
        Classification::Eligible(expected)
    );
}

#[rstest]
#[case("image.png")]
#[case("src/main.ts")]
#[case("Makefile")]
#[case("src/utils")]
#[case("archive.js.bak")]
#[case("")]
fn other_paths_are_ineligible(#[case] path: &str) {
    let result = classify(Path::new(path));
    assert_eq!(result, Classification::Ineligible);
    assert!(!result.is_eligible());
    assert_eq!(result.semantic_type(), None);
}

#[rstest]
#[case("a.js", "", "a.js")]
#[case("src/a.js", "src", "a.js")]
#[case("src/utils/deep/b.css", "src/utils/deep", "b.css")]
fn split_path_yields_directory_and_filename(
    #[case] path: &str,
    #[case] directory: &str,
    #[case] filename: &str,
) {
    assert_eq!(
        split_path(Path::new(path)),
        (directory.to_string(), filename.to_string())
    );
}

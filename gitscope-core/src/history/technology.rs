//! Technology attribution
//!
//! Deterministic map from file extension (and, for ambiguous extensions,
//! path tokens) to exactly one primary technology tag. Unmapped files
//! fall into `other`. The code counter can later override these
//! heuristics where it provides a strictly finer classification.

/// A technology tag plus its document category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TechTag {
    pub tag: &'static str,
    pub category: &'static str,
}

const fn tech(tag: &'static str, category: &'static str) -> TechTag {
    TechTag { tag, category }
}

pub const OTHER: TechTag = tech("other", "other");

/// Extension (lowercase, no dot) → tag. Ambiguous extensions are handled
/// separately in `technology_for_path`.
const EXTENSION_TABLE: &[(&str, TechTag)] = &[
    ("cs", tech("csharp", "language")),
    ("csx", tech("csharp", "language")),
    ("js", tech("javascript", "language")),
    ("jsx", tech("javascript", "language")),
    ("mjs", tech("javascript", "language")),
    ("tsx", tech("typescript", "language")),
    ("py", tech("python", "language")),
    ("pyi", tech("python", "language")),
    ("java", tech("java", "language")),
    ("kt", tech("kotlin", "language")),
    ("kts", tech("kotlin", "language")),
    ("go", tech("go", "language")),
    ("rs", tech("rust", "language")),
    ("c", tech("c", "language")),
    ("cpp", tech("cpp", "language")),
    ("cc", tech("cpp", "language")),
    ("cxx", tech("cpp", "language")),
    ("hpp", tech("cpp", "language")),
    ("rb", tech("ruby", "language")),
    ("php", tech("php", "language")),
    ("swift", tech("swift", "language")),
    ("scala", tech("scala", "language")),
    ("fs", tech("fsharp", "language")),
    ("lua", tech("lua", "language")),
    ("r", tech("r", "language")),
    ("dart", tech("dart", "language")),
    ("groovy", tech("groovy", "language")),
    ("html", tech("html", "web")),
    ("htm", tech("html", "web")),
    ("css", tech("css", "web")),
    ("scss", tech("css", "web")),
    ("less", tech("css", "web")),
    ("vue", tech("javascript", "web")),
    ("svelte", tech("javascript", "web")),
    ("xml", tech("xml", "markup")),
    ("xaml", tech("xml", "markup")),
    ("csproj", tech("xml", "markup")),
    ("svg", tech("xml", "markup")),
    ("json", tech("json", "data")),
    ("yaml", tech("yaml", "data")),
    ("yml", tech("yaml", "data")),
    ("toml", tech("toml", "config")),
    ("ini", tech("config", "config")),
    ("cfg", tech("config", "config")),
    ("properties", tech("config", "config")),
    ("md", tech("markdown", "docs")),
    ("rst", tech("docs", "docs")),
    ("txt", tech("docs", "docs")),
    ("sql", tech("sql", "data")),
    ("sh", tech("shell", "scripting")),
    ("bash", tech("shell", "scripting")),
    ("zsh", tech("shell", "scripting")),
    ("ps1", tech("powershell", "scripting")),
    ("bat", tech("shell", "scripting")),
    ("gradle", tech("build", "config")),
    ("cmake", tech("build", "config")),
    ("proto", tech("protobuf", "data")),
    ("tf", tech("terraform", "config")),
];

/// Special basenames without a meaningful extension.
const BASENAME_TABLE: &[(&str, TechTag)] = &[
    ("dockerfile", tech("docker", "config")),
    ("makefile", tech("build", "config")),
    ("cmakelists.txt", tech("build", "config")),
    ("jenkinsfile", tech("build", "config")),
    ("rakefile", tech("ruby", "language")),
];

/// Primary technology tag for a repository-relative path.
pub fn technology_for_path(path: &str) -> TechTag {
    let basename = path.rsplit('/').next().unwrap_or(path).to_lowercase();
    if let Some((_, tag)) = BASENAME_TABLE.iter().find(|(b, _)| *b == basename) {
        return *tag;
    }

    let Some((_, ext)) = basename.rsplit_once('.') else {
        return OTHER;
    };

    match ext {
        // Ambiguous extensions: decide from path tokens.
        "h" => {
            if has_token(path, &["cpp", "cxx", "c++"]) {
                tech("cpp", "language")
            } else {
                tech("c", "language")
            }
        }
        "m" => {
            if has_token(path, &["matlab"]) {
                tech("matlab", "language")
            } else {
                tech("objectivec", "language")
            }
        }
        "pl" => {
            if has_token(path, &["prolog"]) {
                tech("prolog", "language")
            } else {
                tech("perl", "language")
            }
        }
        "ts" => {
            if has_token(path, &["streams", "video"]) {
                OTHER
            } else {
                tech("typescript", "language")
            }
        }
        _ => EXTENSION_TABLE
            .iter()
            .find(|(e, _)| *e == ext)
            .map(|(_, tag)| *tag)
            .unwrap_or(OTHER),
    }
}

fn has_token(path: &str, tokens: &[&str]) -> bool {
    path.to_lowercase()
        .split('/')
        .any(|segment| tokens.contains(&segment))
}

/// Normalize a code-counter language name to a technology tag, so the
/// counter's finer classification can override extension heuristics.
pub fn tag_for_language_name(name: &str) -> String {
    let lowered = name.trim().to_lowercase();
    match lowered.as_str() {
        "c#" => "csharp".to_string(),
        "f#" => "fsharp".to_string(),
        "c++" => "cpp".to_string(),
        "c++ header" => "cpp".to_string(),
        "c header" => "c".to_string(),
        "objective-c" => "objectivec".to_string(),
        "objective c" => "objectivec".to_string(),
        "plain text" => "docs".to_string(),
        "bourne shell" | "bash" | "shell" => "shell".to_string(),
        _ => lowered.replace([' ', '-'], ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_common_extensions() {
        assert_eq!(technology_for_path("src/main.c").tag, "c");
        assert_eq!(technology_for_path("web/app.js").tag, "javascript");
        assert_eq!(technology_for_path("Api/Program.cs").tag, "csharp");
        assert_eq!(technology_for_path("build.xml").tag, "xml");
        assert_eq!(technology_for_path("scripts/run.py").tag, "python");
    }

    #[test]
    fn test_unmapped_extension_is_other() {
        assert_eq!(technology_for_path("data/archive.xyz").tag, "other");
        assert_eq!(technology_for_path("LICENSE").tag, "other");
    }

    #[test]
    fn test_ambiguous_header_disambiguated_by_path() {
        assert_eq!(technology_for_path("src/cpp/util.h").tag, "cpp");
        assert_eq!(technology_for_path("src/kernel/util.h").tag, "c");
    }

    #[test]
    fn test_special_basenames() {
        assert_eq!(technology_for_path("docker/Dockerfile").tag, "docker");
        assert_eq!(technology_for_path("Makefile").tag, "build");
    }

    #[test]
    fn test_every_file_maps_to_exactly_one_tag() {
        // The table never yields an empty tag, whatever the input.
        for path in ["a.rs", "b", ".hidden", "x/y.unknownext", ""] {
            assert!(!technology_for_path(path).tag.is_empty());
        }
    }

    #[test]
    fn test_language_name_normalization() {
        assert_eq!(tag_for_language_name("C#"), "csharp");
        assert_eq!(tag_for_language_name("C++"), "cpp");
        assert_eq!(tag_for_language_name("JavaScript"), "javascript");
        assert_eq!(tag_for_language_name("Objective-C"), "objectivec");
        assert_eq!(tag_for_language_name("Vim Script"), "vimscript");
    }
}

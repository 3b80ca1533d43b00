/// Where a tool comes from and what it produces
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolIdentity {
    /// Module queried for versions and content sums
    pub module: String,
    /// Package path handed to `go install`
    pub install_target: String,
    pub binary_name: String,
}

/// (short name, module, install target, binary)
const KNOWN_TOOLS: &[(&str, &str, &str, &str)] = &[
    (
        "buf",
        "github.com/bufbuild/buf",
        "github.com/bufbuild/buf/cmd/buf",
        "buf",
    ),
    ("gofumpt", "mvdan.cc/gofumpt", "mvdan.cc/gofumpt", "gofumpt"),
    (
        "goimports",
        "golang.org/x/tools",
        "golang.org/x/tools/cmd/goimports",
        "goimports",
    ),
    (
        "golangci-lint",
        "github.com/golangci/golangci-lint",
        "github.com/golangci/golangci-lint/cmd/golangci-lint",
        "golangci-lint",
    ),
    (
        "gotestsum",
        "gotest.tools/gotestsum",
        "gotest.tools/gotestsum",
        "gotestsum",
    ),
    (
        "govulncheck",
        "golang.org/x/vuln",
        "golang.org/x/vuln/cmd/govulncheck",
        "govulncheck",
    ),
    ("mockgen", "go.uber.org/mock", "go.uber.org/mock/mockgen", "mockgen"),
    (
        "reflex",
        "github.com/cespare/reflex",
        "github.com/cespare/reflex",
        "reflex",
    ),
    (
        "staticcheck",
        "honnef.co/go/tools",
        "honnef.co/go/tools/cmd/staticcheck",
        "staticcheck",
    ),
];

/// Map a declared tool name to its identity. Unknown names are taken to be
/// module paths already.
pub fn resolve_identity(name: &str) -> ToolIdentity {
    if let Some((_, module, target, bin)) = KNOWN_TOOLS.iter().find(|(short, ..)| *short == name) {
        return ToolIdentity {
            module: module.to_string(),
            install_target: target.to_string(),
            binary_name: bin.to_string(),
        };
    }

    ToolIdentity {
        module: name.to_string(),
        install_target: name.to_string(),
        binary_name: infer_binary_name(name),
    }
}

/// Last path segment, skipping one trailing `vN` major-version segment
fn infer_binary_name(module: &str) -> String {
    let segments: Vec<&str> = module
        .trim_end_matches('/')
        .split('/')
        .filter(|s| !s.is_empty())
        .collect();

    match segments.as_slice() {
        [.., name, last] if is_major_version(last) => name.to_string(),
        [.., last] => last.to_string(),
        [] => module.to_string(),
    }
}

fn is_major_version(segment: &str) -> bool {
    segment
        .strip_prefix('v')
        .is_some_and(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
}

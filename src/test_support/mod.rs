//! Fixtures shared by unit tests.
//!
//! Projects are written to real temporary directories. The compiler,
//! archiver and cmake stand-ins are small shell scripts that produce the
//! files the real tools would, so the build and bootstrap paths run end to
//! end without a C++ toolchain.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::bootstrap::ImportedTarget;
use crate::core::project::{Project, DESCRIPTOR_NAME};
use crate::util::config::{Config, ToolsConfig};

fn write(path: &Path, contents: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

/// Write a minimal project rooted at `root` and load it.
///
/// Lint scope: one entry point, one library source, one header, one test
/// and one benchmark.
pub fn sample_project(root: &Path) -> Project {
    write(
        &root.join(DESCRIPTOR_NAME),
        "[project]\nname = \"biscuit\"\n",
    );
    write(
        &root.join("src/main.cpp"),
        "#include \"biscuit.h\"\n\nint main() { return biscuit::answer() == 42 ? 0 : 1; }\n",
    );
    write(
        &root.join("src/common/util.cpp"),
        "#include \"biscuit.h\"\n\nnamespace biscuit {\nint answer() { return 42; }\n}  // namespace biscuit\n",
    );
    write(
        &root.join("src/include/biscuit.h"),
        "#pragma once\n\nnamespace biscuit {\nint answer();\n}  // namespace biscuit\n",
    );
    write(
        &root.join("test/common/util_test.cpp"),
        "#include <gtest/gtest.h>\n#include \"biscuit.h\"\n\nTEST(UtilTest, Answer) { EXPECT_EQ(biscuit::answer(), 42); }\n",
    );
    write(
        &root.join("benchmark/main/biscuit_benchmark.cpp"),
        "#include <benchmark/benchmark.h>\n\nstatic void BM_Answer(benchmark::State& state) {\n  for (auto _ : state) {}\n}\nBENCHMARK(BM_Answer);\n",
    );
    Project::load(root).unwrap()
}

/// Local stand-in for a framework checkout under `<dir>/frameworks/<name>`.
pub fn framework_source(dir: &Path, name: &str) -> PathBuf {
    let src = dir.join("frameworks").join(name);
    write(
        &src.join("CMakeLists.txt"),
        &format!("cmake_minimum_required(VERSION 3.14)\nproject({})\n", name),
    );
    write(&src.join("googletest/include/gtest/gtest.h"), "#pragma once\n");
    write(&src.join("googlemock/include/gmock/gmock.h"), "#pragma once\n");
    write(&src.join("include/benchmark/benchmark.h"), "#pragma once\n");
    src
}

/// A project at `<dir>/project` whose frameworks come from local paths.
pub fn sample_project_with_frameworks(dir: &Path) -> Project {
    let root = dir.join("project");
    sample_project(&root);
    framework_source(dir, "googletest");
    framework_source(dir, "benchmark");

    let descriptor = r#"[project]
name = "biscuit"

[dependencies.googletest]
path = "../frameworks/googletest"
cmake_args = ["-DINSTALL_GTEST=OFF"]

[dependencies.googletest.targets]
gtest = { library = "gtest", include = ["googletest/include"] }
gtest_main = { library = "gtest_main", include = ["googletest/include"] }

[dependencies.benchmark]
path = "../frameworks/benchmark"

[dependencies.benchmark.targets]
benchmark = { library = "benchmark", include = ["include"] }
benchmark_main = { library = "benchmark_main", include = ["include"] }
"#;
    write(&root.join(DESCRIPTOR_NAME), descriptor);
    Project::load(&root).unwrap()
}

/// Pre-built imports for graph tests, with real library files on disk.
pub fn imports_for(root: &Path) -> BTreeMap<String, ImportedTarget> {
    let deps = root.join("deps");
    let gtest_include = deps.join("googletest/googletest/include");
    let benchmark_include = deps.join("benchmark/include");
    fs::create_dir_all(&gtest_include).unwrap();
    fs::create_dir_all(&benchmark_include).unwrap();

    let mut imports = BTreeMap::new();
    for (name, dependency, include) in [
        ("gtest", "googletest", &gtest_include),
        ("gtest_main", "googletest", &gtest_include),
        ("benchmark", "benchmark", &benchmark_include),
        ("benchmark_main", "benchmark", &benchmark_include),
    ] {
        let library = deps.join(format!("{}-build/lib{}.a", dependency, name));
        write(&library, "archive");
        imports.insert(
            name.to_string(),
            ImportedTarget {
                name: name.to_string(),
                dependency: dependency.to_string(),
                library,
                include_dirs: vec![include.clone()],
            },
        );
    }
    imports
}

/// Write an executable `#!/bin/sh` script `<dir>/<name>`.
#[cfg(unix)]
pub fn fake_executable(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    write(&path, &format!("#!/bin/sh\n{}\n", body));
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Compiler stand-in: writes the `-o` output and a `-MF` depfile.
#[cfg(unix)]
pub fn fake_compiler(dir: &Path) -> PathBuf {
    fake_executable(
        &dir.join("toolchain"),
        "c++",
        r#"out=""; dep=""; src=""
while [ $# -gt 0 ]; do
  case "$1" in
    -o) out="$2"; shift ;;
    -MF) dep="$2"; shift ;;
    -c) src="$2"; shift ;;
  esac
  shift
done
mkdir -p "$(dirname "$out")"
echo built > "$out"
if [ -n "$dep" ]; then
  mkdir -p "$(dirname "$dep")"
  echo "$out: $src" > "$dep"
fi
exit 0"#,
    )
}

/// Archiver stand-in for `ar rcs <out> <objects...>`.
///
/// Like `ar r`, members are added to an existing archive and never removed.
/// The archive lists one member name per line.
#[cfg(unix)]
pub fn fake_archiver(dir: &Path) -> PathBuf {
    fake_executable(
        &dir.join("toolchain"),
        "ar",
        r#"out="$2"; shift 2
mkdir -p "$(dirname "$out")"
touch "$out"
for obj in "$@"; do
  member=$(basename "$obj")
  grep -qxF "$member" "$out" || echo "$member" >> "$out"
done
exit 0"#,
    )
}

fn cmake_script(log: &Path, failing: Option<&str>) -> String {
    let fail = |step: &str| {
        if failing == Some(step) {
            format!("echo \"{} exploded\" >&2; exit 1", step)
        } else {
            ":".to_string()
        }
    };
    format!(
        r#"case "$1" in
  -S)
    echo configure >> "{log}"
    {fail_configure}
    mkdir -p "$4"
    touch "$4/CMakeCache.txt"
    ;;
  --build)
    echo build >> "{log}"
    {fail_build}
    mkdir -p "$2/lib"
    for lib in gtest gtest_main benchmark benchmark_main; do
      echo archive > "$2/lib/lib$lib.a"
    done
    ;;
esac
exit 0"#,
        log = log.display(),
        fail_configure = fail("configure"),
        fail_build = fail("build"),
    )
}

/// cmake stand-in that records each step in `<dir>/cmake.log`.
#[cfg(unix)]
pub fn fake_cmake(dir: &Path) -> PathBuf {
    fake_executable(&dir.join("toolchain"), "cmake", &cmake_script(&dir.join("cmake.log"), None))
}

/// cmake stand-in that fails at `step` (`configure` or `build`).
#[cfg(unix)]
pub fn failing_cmake(dir: &Path, step: &str) -> PathBuf {
    fake_executable(
        &dir.join("failing"),
        "cmake",
        &cmake_script(&dir.join("cmake.log"), Some(step)),
    )
}

/// Steps the fake cmake has run, in order.
pub fn fake_cmake_calls(dir: &Path) -> Vec<String> {
    fs::read_to_string(dir.join("cmake.log"))
        .map(|log| log.lines().map(String::from).collect())
        .unwrap_or_default()
}

/// Config using the stand-in toolchain and no system tool lookup.
#[cfg(unix)]
pub fn offline_config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.toolchain.cxx = Some(fake_compiler(dir));
    config.toolchain.ar = Some(fake_archiver(dir));
    config.toolchain.cmake = Some(fake_cmake(dir));
    config.tools = ToolsConfig {
        search_dirs: Vec::new(),
        system_path: Some(false),
        ..Default::default()
    };
    config
}

//! End-to-end install flow against a local directory repository: pull,
//! index, resolve, install, activate.

use std::fs;
use std::path::Path;

use kit::render::Term;
use kit::version::pick_latest;
use kit::Kit;
use tempfile::{tempdir, TempDir};

fn write_package(source: &Path, name: &str, script: &str) {
    let pkg_dir = source.join("packages").join(name);
    fs::create_dir_all(&pkg_dir).unwrap();
    fs::write(pkg_dir.join("package.kit"), script).unwrap();
}

fn open_kit(source: &Path) -> (TempDir, Kit) {
    let home = tempdir().unwrap();
    let manifest = format!(
        r#"export repositories = [
    {{
        name = "local"
        type = "dir"
        url = "{}"
        dir = "packages"
    }}
]
"#,
        source.display()
    );
    fs::write(home.path().join("repositories.kit"), manifest).unwrap();

    let kit = Kit::open_at(home.path(), false, Term::silent()).unwrap();
    (home, kit)
}

const HELLO_SCRIPT: &str = r##"export name = "hello"

export fn versions() {
    return ["1.3.0-rc1", "0.9.0", "1.2.0", "0.9.0"]
}

export fn install(version) {
    fs.file("bin/hello").create_with_perms(493).write_and_close("#!/bin/sh\necho hello ${version}\n")
    link_bin_dir("bin")
}
"##;

#[test]
fn installs_a_local_package_end_to_end() {
    let source = tempdir().unwrap();
    write_package(source.path(), "hello", HELLO_SCRIPT);

    let (home, kit) = open_kit(source.path());
    kit.pull_repos().unwrap();

    let packages = kit.load_package("hello").unwrap();
    assert_eq!(packages.len(), 1);
    let pkg = &packages[0];
    assert_eq!(pkg.repo, "local");

    // Sorted ascending, deduplicated; the pre-release ranks below 1.3.0 but
    // above 1.2.0.
    let versions = pkg.versions(&kit).unwrap();
    assert_eq!(versions, ["0.9.0", "1.2.0", "1.3.0-rc1"]);
    // `latest` skips versions containing letters.
    assert_eq!(pick_latest(&versions), Some("1.2.0"));

    pkg.install(&kit, "1.2.0").unwrap();

    let payload = home.path().join("packages/hello/v1.2.0/bin/hello");
    assert_eq!(
        fs::read_to_string(&payload).unwrap(),
        "#!/bin/sh\necho hello 1.2.0\n"
    );

    #[cfg(unix)]
    {
        let link = home.path().join("bin/hello");
        let target = fs::read_link(&link).unwrap();
        assert_eq!(
            target,
            Path::new("../packages/hello/v1.2.0/bin/hello"),
            "bin link must point into the mounted payload"
        );
        assert_eq!(
            fs::read_to_string(&link).unwrap(),
            "#!/bin/sh\necho hello 1.2.0\n"
        );

        use std::os::unix::fs::PermissionsExt;
        let mode = fs::metadata(&payload).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }

    assert_eq!(
        kit.db()
            .installation_active("hello", "local", "1.2.0")
            .unwrap(),
        Some(true)
    );

    // Staging was promoted, not copied; nothing lingers in tmp.
    let leftovers: Vec<_> = fs::read_dir(home.path().join("tmp")).unwrap().collect();
    assert!(leftovers.is_empty());
}

#[test]
fn failed_install_leaves_no_trace() {
    let source = tempdir().unwrap();
    write_package(
        source.path(),
        "broken",
        r#"export name = "broken"

export fn versions() {
    return ["1.0.0"]
}

export fn install(version) {
    fs.file("bin/tool").create_with_perms(493).write_and_close("data")
    link_bin_dir("bin")
    throw error("upstream checksum mismatch")
}
"#,
    );

    let (home, kit) = open_kit(source.path());
    kit.pull_repos().unwrap();

    let packages = kit.load_package("broken").unwrap();
    let err = packages[0].install(&kit, "1.0.0").unwrap_err();
    assert!(err.to_string().contains("upstream checksum mismatch"));

    // No payload was promoted, no installation became active, no bin link
    // appeared and the staging directory was cleaned up.
    assert!(!home.path().join("packages/broken/v1.0.0").exists());
    assert_eq!(
        kit.db()
            .installation_active("broken", "local", "1.0.0")
            .unwrap(),
        None
    );
    assert!(!home.path().join("bin/tool").exists());
    let leftovers: Vec<_> = fs::read_dir(home.path().join("tmp")).unwrap().collect();
    assert!(leftovers.is_empty());
}

#[test]
fn reinstalling_replaces_the_payload() {
    let source = tempdir().unwrap();
    write_package(source.path(), "hello", HELLO_SCRIPT);

    let (home, kit) = open_kit(source.path());
    kit.pull_repos().unwrap();
    let packages = kit.load_package("hello").unwrap();

    packages[0].install(&kit, "1.2.0").unwrap();
    // A stale file in the mount dir disappears on reinstall.
    fs::write(
        home.path().join("packages/hello/v1.2.0/stale.txt"),
        b"old",
    )
    .unwrap();
    packages[0].install(&kit, "1.2.0").unwrap();

    assert!(!home.path().join("packages/hello/v1.2.0/stale.txt").exists());
    assert!(home.path().join("packages/hello/v1.2.0/bin/hello").exists());
}

#[test]
fn pulling_again_reindexes_the_repo() {
    let source = tempdir().unwrap();
    write_package(source.path(), "hello", HELLO_SCRIPT);

    let (_home, kit) = open_kit(source.path());
    kit.pull_repos().unwrap();
    assert_eq!(kit.load_package("hello").unwrap().len(), 1);

    // Replace the package set in the source repository.
    fs::remove_dir_all(source.path().join("packages/hello")).unwrap();
    write_package(
        source.path(),
        "goodbye",
        "export name = \"goodbye\"\n\nexport fn versions() {\n    return [\"1.0.0\"]\n}\n\nexport fn install(version) {\n    link_bin_dir(\"bin\")\n}\n",
    );

    kit.pull_repos().unwrap();
    assert!(kit.load_package("hello").unwrap().is_empty());
    assert_eq!(kit.load_package("goodbye").unwrap().len(), 1);
}

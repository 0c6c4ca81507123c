//! Install-time host bindings for package scripts.
//!
//! Configured with the staging root and the final mount path, these expose
//! `sys`, the `tar`/`zip` extraction builders, `fs` file builders and the
//! `link_bin_*` mount intents. During repository indexing the same names are
//! bound inert so a script's top level can run (to read its `name` export)
//! without any network or disk side effects.

use std::cell::RefCell;
use std::fs::File;
use std::io::{Cursor, Read, Write};
use std::path::PathBuf;
use std::rc::Rc;

use crate::fsroot::RootDir;
use crate::include;
use crate::io::extract::{extract_tar, extract_zip, ExtractOptions};
use crate::lang::env::Environment;
use crate::lang::error::RuntimeError;
use crate::lang::stdlib::{self, reader_binding, BindingReader};
use crate::lang::value::{Kind, Object, Value};
use crate::mount::Mount;

/// A deferred `link_bin` intent produced by `link_bin_dir`/`link_bin_file`.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkIntent {
    pub target: String,
    pub link_name: String,
}

#[derive(Clone)]
pub struct InstallBinding {
    root: Option<Rc<RootDir>>,
    mount_dir: Option<PathBuf>,
    intents: Rc<RefCell<Vec<LinkIntent>>>,
}

enum TarCompression {
    Gz,
    Xz,
}

impl InstallBinding {
    pub fn new(root: RootDir, mount_dir: PathBuf) -> InstallBinding {
        InstallBinding {
            root: Some(Rc::new(root)),
            mount_dir: Some(mount_dir),
            intents: Rc::new(RefCell::new(Vec::new())),
        }
    }

    /// Bindings for indexing: the names exist but invoking them is an
    /// error.
    pub fn inert() -> InstallBinding {
        InstallBinding {
            root: None,
            mount_dir: None,
            intents: Rc::new(RefCell::new(Vec::new())),
        }
    }

    pub fn load(&self, env: &Rc<Environment>) {
        env.set_scoped("sys", sys_object());
        env.set_scoped("tar", self.tar_object());
        env.set_scoped("zip", self.zip_object());
        env.set_scoped("fs", self.fs_object());
        env.set_scoped("link_bin_dir", self.link_bin_dir_fn());
        env.set_scoped("link_bin_file", self.link_bin_file_fn());
        if let Some(mount_dir) = &self.mount_dir {
            let install = Object::new();
            install.put(
                "mount_dir",
                Value::string(mount_dir.to_string_lossy().as_ref()),
            );
            env.set_scoped("install", install.val());
        }

        let binding = self.clone();
        env.set_mod_loader(Rc::new(move |name| {
            let Some(src) = include::lib_module(name) else {
                return Err(RuntimeError::new(format!(
                    "module \"{name}\" not found in the script library"
                )));
            };
            let module = Environment::new();
            stdlib::load(&module);
            binding.load(&module);
            let prog =
                crate::lang::parse(src).map_err(RuntimeError::lift)?;
            module.execute(&prog)?;
            Ok(module)
        }));
    }

    /// Replays the collected link intents into the mount record.
    pub fn setup_mount(&self, mount: &mut Mount<'_>) -> Result<(), crate::db::DbError> {
        for intent in self.intents.borrow().iter() {
            mount.link_bin(&intent.target, &intent.link_name)?;
        }
        Ok(())
    }

    #[cfg(test)]
    pub fn intents(&self) -> Vec<LinkIntent> {
        self.intents.borrow().clone()
    }

    fn require_root(&self, fn_name: &str) -> Result<Rc<RootDir>, RuntimeError> {
        self.root.clone().ok_or_else(|| {
            RuntimeError::new(format!(
                "{fn_name} is not available while the package is being indexed"
            ))
        })
    }

    fn tar_object(&self) -> Value {
        let tar = Object::new();

        let gz = Object::new();
        gz.put("extract", self.tar_extract_fn(TarCompression::Gz));
        tar.put("gz", gz.val());

        let xz = Object::new();
        xz.put("extract", self.tar_extract_fn(TarCompression::Xz));
        tar.put("xz", xz.val());

        tar.val()
    }

    fn tar_extract_fn(&self, compression: TarCompression) -> Value {
        let binding = self.clone();
        let fn_name = match compression {
            TarCompression::Gz => "tar.gz.extract",
            TarCompression::Xz => "tar.xz.extract",
        };
        Value::fn1(move |src| {
            let root = binding.require_root(fn_name)?;
            let src = reader_binding(&src, fn_name)?;
            let opts = Rc::new(RefCell::new(ExtractOptions::default()));

            let obj = Rc::new(Object::new());
            builder_option_str(&obj, "from_archive_dir", fn_name, &opts, |opts, dir| {
                opts.archive_dir = dir;
            });
            builder_flag(&obj, "skipping_base_dir", &opts, |opts| {
                opts.skip_base_dir = true;
            });
            builder_option_str(&obj, "ignoring_dir", fn_name, &opts, |opts, dir| {
                opts.ignore_dirs.push(dir);
            });

            let decode_gz = matches!(compression, TarCompression::Gz);
            let opts_for_run = opts.clone();
            obj.put(
                "to",
                Value::fn1(move |dst| {
                    let Some(dst) = dst.as_str() else {
                        return Err(RuntimeError::type_error(fn_name, Kind::String));
                    };
                    let dst_root = root.open_subdir(dst).map_err(RuntimeError::lift)?;
                    let opts = opts_for_run.borrow().clone();
                    let reader = BindingReader(src.clone());
                    let result = if decode_gz {
                        extract_tar(flate2::read::GzDecoder::new(reader), &opts, &dst_root)
                    } else {
                        extract_tar(xz2::read::XzDecoder::new(reader), &opts, &dst_root)
                    };
                    result.map_err(RuntimeError::lift)?;
                    Ok(Value::Nil)
                }),
            );

            Ok(Value::Object(obj))
        })
    }

    fn zip_object(&self) -> Value {
        let binding = self.clone();
        let zip = Object::new();
        zip.put(
            "extract",
            Value::fn1(move |src| {
                let root = binding.require_root("zip.extract")?;
                let src = reader_binding(&src, "zip.extract")?;
                let opts = Rc::new(RefCell::new(ExtractOptions::default()));

                let obj = Rc::new(Object::new());
                builder_option_str(&obj, "from_archive_dir", "zip.extract", &opts, |o, dir| {
                    o.archive_dir = dir;
                });

                let opts_for_run = opts.clone();
                obj.put(
                    "to",
                    Value::fn1(move |dst| {
                        let Some(dst) = dst.as_str() else {
                            return Err(RuntimeError::type_error(
                                "zip.extract(...).to",
                                Kind::String,
                            ));
                        };
                        // Zip needs random access; buffer the source.
                        let mut contents = Vec::new();
                        BindingReader(src.clone()).read_to_end(&mut contents)?;

                        let dst_root = root.open_subdir(dst).map_err(RuntimeError::lift)?;
                        let opts = opts_for_run.borrow().clone();
                        extract_zip(Cursor::new(contents), &opts, &dst_root)
                            .map_err(RuntimeError::lift)?;
                        Ok(Value::Nil)
                    }),
                );

                Ok(Value::Object(obj))
            }),
        );
        zip.val()
    }

    fn fs_object(&self) -> Value {
        let fs = Object::new();

        let binding = self.clone();
        fs.put(
            "file",
            Value::fn1(move |path| {
                let Some(path) = path.as_str() else {
                    return Err(RuntimeError::type_error("fs.file", Kind::String));
                };
                let root = binding.require_root("fs.file")?;
                Ok(file_builder(&root, path))
            }),
        );

        let binding = self.clone();
        fs.put(
            "dir",
            Value::fn1(move |path| {
                let Some(path) = path.as_str() else {
                    return Err(RuntimeError::type_error("fs.dir", Kind::String));
                };
                let root = binding.require_root("fs.dir")?;

                let dir = Object::new();
                let root = root.clone();
                let path = path.to_string();
                dir.put(
                    "read_entries",
                    Value::fn0(move || {
                        let entries = root.read_dir(&path).map_err(RuntimeError::lift)?;
                        let items = entries
                            .iter()
                            .map(|entry| file_builder(&root, &format!("{path}/{entry}")))
                            .collect();
                        Ok(Value::list(items))
                    }),
                );
                Ok(dir.val())
            }),
        );

        fs.val()
    }

    fn link_bin_dir_fn(&self) -> Value {
        let binding = self.clone();
        Value::fn1(move |dir| {
            let Some(dir) = dir.as_str() else {
                return Err(RuntimeError::type_error("link_bin_dir", Kind::String));
            };
            let root = binding.require_root("link_bin_dir")?;

            // Entries are enumerated at declaration time.
            let dir = dir.trim_matches('/');
            let entries = root.read_dir(dir).map_err(RuntimeError::lift)?;
            let mut intents = binding.intents.borrow_mut();
            for entry in entries {
                intents.push(LinkIntent {
                    target: format!("{dir}/{entry}"),
                    link_name: entry,
                });
            }
            Ok(Value::Nil)
        })
    }

    fn link_bin_file_fn(&self) -> Value {
        let binding = self.clone();
        Value::fn1(move |path| {
            let Some(path) = path.as_str() else {
                return Err(RuntimeError::type_error("link_bin_file", Kind::String));
            };
            binding.require_root("link_bin_file")?;

            let path = path.trim_matches('/');
            let link_name = path.rsplit('/').next().unwrap_or(path).to_string();
            binding.intents.borrow_mut().push(LinkIntent {
                target: path.to_string(),
                link_name,
            });
            Ok(Value::Nil)
        })
    }
}

fn sys_object() -> Value {
    let sys = Object::new();
    sys.put("OS", Value::string(host_os()));
    sys.put("ARCH", Value::string(host_arch()));
    sys.val()
}

// Platform identifiers use the names package scripts expect in release
// artifact URLs.
fn host_os() -> &'static str {
    match std::env::consts::OS {
        "macos" => "darwin",
        other => other,
    }
}

fn host_arch() -> &'static str {
    match std::env::consts::ARCH {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        other => other,
    }
}

fn file_builder(root: &Rc<RootDir>, path: &str) -> Value {
    let obj = Rc::new(Object::new());
    let path = path.trim_matches('/').to_string();
    let name = path.rsplit('/').next().unwrap_or(&path).to_string();
    obj.put("name", Value::string(&name));
    obj.put("path", Value::string(&path));

    let handle: Rc<RefCell<Option<File>>> = Rc::new(RefCell::new(None));

    // The builder captures itself so chained calls keep it alive after the
    // receiver value is dropped.
    let this = obj.clone();
    let open_root = root.clone();
    let open_path = path.clone();
    let open_handle = handle.clone();
    obj.put(
        "create_with_perms",
        Value::fn1(move |mode| {
            let Some(mode) = mode.as_number() else {
                return Err(RuntimeError::type_error(
                    "fs.file(...).create_with_perms",
                    Kind::Number,
                ));
            };
            if let Some((parent, _)) = open_path.rsplit_once('/') {
                open_root.mkdir_all(parent, 0o755).map_err(RuntimeError::lift)?;
            }
            let file = open_root
                .create_file(&open_path, mode as u32)
                .map_err(RuntimeError::lift)?;
            *open_handle.borrow_mut() = Some(file);
            Ok(Value::Object(this.clone()))
        }),
    );

    let write_handle = handle;
    obj.put(
        "write_and_close",
        Value::fn1(move |contents| {
            let Some(contents) = contents.as_str() else {
                return Err(RuntimeError::type_error(
                    "fs.file(...).write_and_close",
                    Kind::String,
                ));
            };
            let Some(mut file) = write_handle.borrow_mut().take() else {
                return Err(RuntimeError::new(
                    "fs.file(...).write_and_close requires create_with_perms first",
                ));
            };
            file.write_all(contents.as_bytes())?;
            Ok(Value::Nil)
        }),
    );

    let link_root = root.clone();
    let link_path = path;
    obj.put(
        "symlink",
        Value::fn1(move |target| {
            let Some(target) = target.as_str() else {
                return Err(RuntimeError::type_error("fs.file(...).symlink", Kind::String));
            };
            link_root
                .symlink(&link_path, target)
                .map_err(RuntimeError::lift)?;
            Ok(Value::Nil)
        }),
    );

    Value::Object(obj)
}

// Builder methods return the builder itself; it is captured strongly so the
// chain stays alive after each intermediate receiver is dropped.
fn builder_option_str(
    obj: &Rc<Object>,
    key: &str,
    fn_name: &'static str,
    opts: &Rc<RefCell<ExtractOptions>>,
    apply: impl Fn(&mut ExtractOptions, String) + 'static,
) {
    let this = obj.clone();
    let opts = opts.clone();
    obj.put(
        key,
        Value::fn1(move |v| {
            let Some(v) = v.as_str() else {
                return Err(RuntimeError::type_error(fn_name, Kind::String));
            };
            apply(&mut opts.borrow_mut(), v.to_string());
            Ok(Value::Object(this.clone()))
        }),
    );
}

fn builder_flag(
    obj: &Rc<Object>,
    key: &str,
    opts: &Rc<RefCell<ExtractOptions>>,
    apply: impl Fn(&mut ExtractOptions) + 'static,
) {
    let this = obj.clone();
    let opts = opts.clone();
    obj.put(
        key,
        Value::fn0(move || {
            apply(&mut opts.borrow_mut());
            Ok(Value::Object(this.clone()))
        }),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang;
    use tempfile::tempdir;

    fn run_install_script(src: &str, staging: &std::path::Path) -> InstallBinding {
        let env = lang::execute(src).unwrap();
        stdlib::load(&env);
        let binding = InstallBinding::new(
            RootDir::open(staging).unwrap(),
            staging.join("mount"),
        );
        binding.load(&env);
        let install = env.get_export("install").unwrap();
        install.call(Some(Value::string("1.0.0"))).unwrap();
        binding
    }

    #[test]
    fn fs_file_create_and_link_bin_dir() {
        let staging = tempdir().unwrap();
        let binding = run_install_script(
            r##"export fn install(version) {
    fs.file("bin/tool").create_with_perms(493).write_and_close("#!/bin/sh\n")
    link_bin_dir("bin")
}"##,
            staging.path(),
        );

        let written = std::fs::read_to_string(staging.path().join("bin/tool")).unwrap();
        assert_eq!(written, "#!/bin/sh\n");

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(staging.path().join("bin/tool"))
                .unwrap()
                .permissions()
                .mode();
            assert_eq!(mode & 0o777, 0o755);
        }

        assert_eq!(
            binding.intents(),
            vec![LinkIntent {
                target: "bin/tool".into(),
                link_name: "tool".into(),
            }]
        );
    }

    #[test]
    fn link_bin_file_records_one_intent() {
        let staging = tempdir().unwrap();
        let binding = run_install_script(
            r#"export fn install(version) {
    fs.file("libexec/run.sh").create_with_perms(493).write_and_close("x")
    link_bin_file("libexec/run.sh")
}"#,
            staging.path(),
        );
        assert_eq!(
            binding.intents(),
            vec![LinkIntent {
                target: "libexec/run.sh".into(),
                link_name: "run.sh".into(),
            }]
        );
    }

    #[test]
    fn tar_extract_builder_runs_through_the_script() {
        // Build a gzipped tarball and hand it to the script as a binding.
        let mut builder = tar::Builder::new(Vec::new());
        let mut header = tar::Header::new_gnu();
        header.set_size(5);
        header.set_mode(0o755);
        header.set_cksum();
        builder.append_data(&mut header, "go/bin/go", &b"hello"[..]).unwrap();
        let tar_bytes = builder.into_inner().unwrap();

        let mut gz = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        gz.write_all(&tar_bytes).unwrap();
        let gz_bytes = gz.finish().unwrap();

        let staging = tempdir().unwrap();
        let env = lang::execute(
            r#"export fn install(src) {
    tar.gz.extract(src).from_archive_dir("go").to("/")
    link_bin_dir("/bin")
}"#,
        )
        .unwrap();
        stdlib::load(&env);
        let binding = InstallBinding::new(
            RootDir::open(staging.path()).unwrap(),
            staging.path().join("mount"),
        );
        binding.load(&env);

        let src = Object::new();
        src.set_binding(Rc::new(RefCell::new(Cursor::new(gz_bytes))));
        env.get_export("install")
            .unwrap()
            .call(Some(src.val()))
            .unwrap();

        let extracted = std::fs::read(staging.path().join("bin/go")).unwrap();
        assert_eq!(extracted, b"hello");
        assert_eq!(binding.intents()[0].link_name, "go");
    }

    #[test]
    fn inert_bindings_reject_calls() {
        let env = lang::execute(
            "export name = \"go\"\nexport fn install(version) { link_bin_dir(\"bin\") }",
        )
        .unwrap();
        InstallBinding::inert().load(&env);
        assert_eq!(env.get_export("name").unwrap().as_str(), Some("go"));

        let err = env
            .get_export("install")
            .unwrap()
            .call(Some(Value::string("1")))
            .unwrap_err();
        assert!(err.message().contains("not available"));
    }
}

use std::fs;
use test_log::test;
use typefuzz::Error;
use typefuzz::case::*;

struct Truncate {
    seen: Vec<(u32, ErrorKind)>,
}

impl Reducer for Truncate {
    fn reduce(&mut self, case: &Case, kind: ErrorKind) -> typefuzz::Result<Reduction> {
        self.seen.push((case.opt_level, kind));
        let code = case.code.lines().next().unwrap_or_default().to_string();
        let extra = match kind {
            ErrorKind::Compute => format!("mismatch at opt_level={}", case.opt_level),
            _ => String::new(),
        };
        Ok(Reduction { code, extra })
    }
}

fn case(kind: ErrorKind, opt_level: u32) -> Case {
    Case {
        kinds: vec![kind],
        code: "v0: float32[2]\n0:\tv1 = abs(v0) : float32[2]\n".to_string(),
        error: "TVMError: something broke\nat line 2\n".to_string(),
        opt_level,
        inputs: None,
        params: None,
    }
}

#[test]
fn test_save_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("0");
    let original = case(ErrorKind::Run, 3);
    original.save(&path).unwrap();
    assert!(path.join("RUN").is_file());
    let text = fs::read_to_string(path.join(ERROR_FILE)).unwrap();
    assert!(text.starts_with("opt_level=3\n"));

    let loaded = Case::load(&path).unwrap();
    assert_eq!(loaded, original);
}

#[test]
fn test_archives_are_kept_by_path() {
    let dir = tempfile::tempdir().unwrap();
    let archive = dir.path().join("weights.npz");
    fs::write(&archive, b"PK").unwrap();
    let mut original = case(ErrorKind::Compile, 1);
    original.params = Some(archive);
    let path = dir.path().join("4");
    original.save(&path).unwrap();

    let loaded = Case::load(&path).unwrap();
    assert_eq!(loaded.params, Some(path.join(PARAMS_FILE)));
    assert_eq!(loaded.inputs, None);
    assert_eq!(fs::read(path.join(PARAMS_FILE)).unwrap(), b"PK");
}

#[test]
fn test_malformed_error_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path();
    fs::write(path.join(CODE_FILE), "x").unwrap();
    fs::write(path.join(ERROR_FILE), "level 3\nboom").unwrap();
    assert!(matches!(Case::load(path), Err(Error::Case(_))));
    fs::remove_file(path.join(ERROR_FILE)).unwrap();
    assert!(matches!(Case::load(path), Err(Error::Io(_))));
}

#[test]
fn test_reduce_cases_in_numeric_order() {
    let dir = tempfile::tempdir().unwrap();
    case(ErrorKind::Compile, 2).save(dir.path().join("10")).unwrap();
    case(ErrorKind::Compute, 1).save(dir.path().join("9")).unwrap();
    case(ErrorKind::Run, 0).save(dir.path().join("2")).unwrap();
    fs::create_dir(dir.path().join("notes")).unwrap();

    let mut reducer = Truncate { seen: vec![] };
    let written = reduce_cases(dir.path(), &mut reducer).unwrap();
    assert_eq!(written, 3);
    assert_eq!(
        reducer.seen,
        vec![
            (0, ErrorKind::Run),
            (1, ErrorKind::Compute),
            (2, ErrorKind::Compile)
        ]
    );

    let reduced = fs::read_to_string(dir.path().join("10").join(REDUCED_FILE)).unwrap();
    assert_eq!(reduced, "v0: float32[2]");
    assert!(!dir.path().join("10").join(EXTRA_FILE).exists());
    let extra = fs::read_to_string(dir.path().join("9").join(EXTRA_FILE)).unwrap();
    assert_eq!(extra, "mismatch at opt_level=1");
}

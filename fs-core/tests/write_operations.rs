use metafs::{ErrorKind, FileSystemManager, FsConfig, ListingEntry};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::TempDir;

// Helper function to create a test filesystem
fn setup_test_fs() -> (TempDir, FileSystemManager) {
    env_logger::builder().is_test(true).try_init().ok();
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let fs = FileSystemManager::open(FsConfig::new(dir.path())).expect("Failed to open filesystem");
    (dir, fs)
}

fn random_content(rng: &mut StdRng) -> Vec<u8> {
    let len = rng.gen_range(0..20_000);
    (0..len).map(|_| rng.gen()).collect()
}

#[test]
fn test_write_read_round_trip() {
    let (_dir, mut fs) = setup_test_fs();
    let mut rng = StdRng::seed_from_u64(1);

    let paths = ["/a.txt", "/docs/readme.txt", "docs\\nested\\deep.bin", "/docs/empty"];
    for path in paths {
        let content = random_content(&mut rng);
        fs.write_file(path, &content).unwrap();
        assert_eq!(fs.read_file(path).unwrap(), content, "round trip through cache for {path}");

        fs.invalidate_cache(None);
        assert_eq!(fs.read_file(path).unwrap(), content, "round trip from disk for {path}");
    }

    fs.write_file("/docs/empty", b"").unwrap();
    assert!(fs.read_file("/docs/empty").unwrap().is_empty());
    assert!(fs.stat("/docs/empty").unwrap().blocks.is_empty());
}

#[test]
fn test_block_conservation() {
    let (_dir, mut fs) = setup_test_fs();
    let mut rng = StdRng::seed_from_u64(99);
    let names: Vec<String> = (0..12).map(|i| format!("/dir{}/file{}", i % 3, i)).collect();

    for step in 0..200 {
        let path = &names[rng.gen_range(0..names.len())];
        match rng.gen_range(0..3) {
            0 | 1 => {
                let len = rng.gen_range(0..60_000);
                fs.write_file(path, &vec![step as u8; len]).unwrap();
            }
            _ => {
                if let Err(e) = fs.delete_file(path) {
                    assert_eq!(e.kind(), ErrorKind::NotFound);
                }
            }
        }
        let problems = fs.audit();
        assert!(problems.is_empty(), "step {step}: {problems:?}");
    }

    // The same invariant holds for the state read back from disk
    let table = fs.table().clone();
    let root = fs.layout().root.clone();
    drop(fs);
    let fs = FileSystemManager::open(FsConfig::new(root)).unwrap();
    assert_eq!(fs.table(), &table);
    assert!(fs.audit().is_empty());
}

#[test]
fn test_pool_grows_when_exhausted() {
    env_logger::builder().is_test(true).try_init().ok();
    let dir = tempfile::tempdir().unwrap();
    let mut config = FsConfig::new(dir.path());
    config.initial_blocks = 4;
    config.block_size = 16;
    let mut fs = FileSystemManager::open(config).unwrap();

    fs.write_file("/a", &[1u8; 48]).unwrap();
    fs.write_file("/b", &[2u8; 48]).unwrap();
    assert_eq!(fs.stat("/a").unwrap().blocks, vec![1, 2, 3]);
    assert_eq!(fs.stat("/b").unwrap().blocks, vec![4, 5, 6]);
    assert_eq!(fs.allocator().high_water(), 6);
    assert!(fs.audit().is_empty());
}

#[test]
fn test_delete_removes_listing_and_frees_blocks() {
    let (_dir, mut fs) = setup_test_fs();
    fs.write_file("/docs/a.txt", &vec![0u8; 10_000]).unwrap();
    fs.write_file("/docs/b.txt", b"b").unwrap();
    let free_before = fs.allocator().free_count();

    fs.delete_file("/docs/a.txt").unwrap();
    assert_eq!(fs.allocator().free_count(), free_before + 3);

    let listing = fs.list_directory("/docs").unwrap();
    assert!(!listing.contents.contains_key("a.txt"));
    assert!(listing.contents.contains_key("b.txt"));

    let err = fs.read_file("/docs/a.txt").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(fs.delete_file("/docs/a.txt").unwrap_err().kind(), ErrorKind::NotFound);
}

#[test]
fn test_directory_tree_operations() {
    let (dir, mut fs) = setup_test_fs();
    fs.create_directory("/projects/alpha/src").unwrap();
    fs.create_file("/projects/alpha/src/main.rs", b"fn main() {}").unwrap();
    fs.create_file("/projects/notes.md", b"notes").unwrap();

    let listing = fs.list_directory("/projects").unwrap();
    match &listing.contents["alpha"] {
        ListingEntry::Directory { item_count, .. } => assert_eq!(*item_count, 1),
        other => panic!("expected directory, got {:?}", other),
    }
    match &listing.contents["notes.md"] {
        ListingEntry::File { size, .. } => assert_eq!(*size, 5),
        other => panic!("expected file, got {:?}", other),
    }

    assert_eq!(
        fs.delete_directory("/projects/alpha", false).unwrap_err().kind(),
        ErrorKind::NotEmpty
    );
    fs.delete_directory("/projects/alpha", true).unwrap();
    assert!(!dir.path().join("projects/alpha").exists());
    assert_eq!(fs.list_directory("/projects").unwrap().contents.len(), 1);

    fs.delete_file("/projects/notes.md").unwrap();
    fs.delete_directory("/projects", false).unwrap();
    assert!(fs.list_directory("/").unwrap().contents.is_empty());
    assert_eq!(fs.allocator().free_count(), 1000);
}

#[test]
fn test_deep_trees_do_not_recurse() {
    let (_dir, mut fs) = setup_test_fs();
    let deep: String = (0..40).map(|i| format!("/d{i}")).collect();
    fs.create_directory(&deep).unwrap();
    fs.write_file(&format!("{deep}/leaf.txt"), b"leaf").unwrap();

    fs.delete_directory("/d0", true).unwrap();
    assert_eq!(fs.table().directory_count(), 1);
    assert_eq!(fs.table().file_count(), 0);
}

#[test]
fn test_store_files_are_not_addressable() {
    let (dir, mut fs) = setup_test_fs();
    fs.write_file("/keep.txt", b"keep").unwrap();
    let keep_backups = fs.layout().file_backups("/keep.txt").unwrap();

    for path in ["/fs_metadata.json", "fs_metadata.json.tmp", "/.backups", "/.backups/x", "\\.backups\\"] {
        let invalid = |result: metafs::Result<()>| result.unwrap_err().kind() == ErrorKind::InvalidPath;
        assert!(invalid(fs.create_file(path, b"hello")), "create_file {path}");
        assert!(invalid(fs.write_file(path, b"hello")), "write_file {path}");
        assert!(invalid(fs.create_directory(path)), "create_directory {path}");
        assert!(invalid(fs.delete_directory(path, true)), "delete_directory {path}");
        assert!(invalid(fs.delete_file(path)), "delete_file {path}");
        assert_eq!(fs.read_file(path).unwrap_err().kind(), ErrorKind::InvalidPath);
        assert_eq!(fs.list_directory(path).unwrap_err().kind(), ErrorKind::InvalidPath);
    }

    assert!(dir.path().join(".backups").is_dir());
    assert_eq!(fs.layout().file_backups("/keep.txt").unwrap(), keep_backups);
    drop(fs);

    let mut fs = FileSystemManager::open(FsConfig::new(dir.path())).unwrap();
    assert_eq!(fs.read_file("/keep.txt").unwrap(), b"keep");
    assert!(fs.audit().is_empty());
}

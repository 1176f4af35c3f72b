use lib::testing::{make_git, GitRunOptions};

#[test]
fn test_help_lists_subcommands() -> eyre::Result<()> {
    let git = make_git()?;
    git.init_repo()?;

    let (stdout, _stderr) = git.tidy("help", &[])?;
    for subcommand in [
        "setup",
        "test",
        "test-coverage",
        "lint",
        "sync",
        "squash",
        "prepare-pr",
    ] {
        assert!(stdout.contains(subcommand), "{subcommand} missing: {stdout}");
    }

    Ok(())
}

#[test]
fn test_unknown_subcommand() -> eyre::Result<()> {
    let git = make_git()?;
    git.init_repo()?;

    let (_stdout, stderr) = git.tidy_with_options(
        "frobnicate",
        &[],
        &GitRunOptions {
            expected_exit_code: 2,
            ..Default::default()
        },
    )?;
    assert!(stderr.contains("frobnicate"), "{stderr}");

    Ok(())
}

#[test]
fn test_install_man_pages() -> eyre::Result<()> {
    let git = make_git()?;
    git.init_repo()?;
    let man_dir = tempfile::tempdir()?;
    let man_dir_path = man_dir
        .path()
        .to_str()
        .ok_or_else(|| eyre::eyre!("Could not convert man dir path to string"))?;

    let (stdout, _stderr) = git.tidy("install-man-pages", &[man_dir_path])?;
    assert_eq!(stdout, format!("Installed man-pages to: {man_dir_path}\n"));
    assert!(man_dir.path().join("man1").join("git-tidy.1").exists());
    assert!(man_dir
        .path()
        .join("man1")
        .join("git-tidy-prepare-pr.1")
        .exists());

    Ok(())
}

#[test]
fn test_version() -> eyre::Result<()> {
    let output = assert_cmd::Command::cargo_bin("git-tidy")?
        .arg("--version")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let stdout = String::from_utf8(output)?;
    assert_eq!(
        stdout,
        format!("git-tidy {}\n", env!("CARGO_PKG_VERSION"))
    );
    Ok(())
}

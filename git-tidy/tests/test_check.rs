use std::collections::HashMap;

use lib::testing::{make_git, GitRunOptions};

#[test]
fn test_test_passes_extra_args() -> eyre::Result<()> {
    let git = make_git()?;
    git.init_repo()?;
    git.run(&["config", "tidy.command.test", "echo running tests"])?;

    let (stdout, stderr) = git.tidy("test", &["--", "-k", "foo bar"])?;
    insta::assert_snapshot!(stdout, @r###"
    Running tests: echo running tests -k 'foo bar'
    running tests -k foo bar
    ✓ Tests succeeded
    "###);
    insta::assert_snapshot!(stderr, @"");

    Ok(())
}

#[test]
fn test_lint_failure_exit_code() -> eyre::Result<()> {
    let git = make_git()?;
    git.init_repo()?;
    git.run(&[
        "config",
        "tidy.command.lint",
        "echo trailing whitespace >&2; exit 3",
    ])?;

    let (stdout, stderr) = git.tidy_with_options(
        "lint",
        &[],
        &GitRunOptions {
            expected_exit_code: 3,
            ..Default::default()
        },
    )?;
    insta::assert_snapshot!(stdout, @r###"
    Running linters: echo trailing whitespace >&2; exit 3
    "###);
    insta::assert_snapshot!(stderr, @r###"
    trailing whitespace
    X Linters failed with exit code 3
    "###);

    Ok(())
}

#[test]
fn test_test_coverage_runs_in_working_copy_root() -> eyre::Result<()> {
    let git = make_git()?;
    git.init_repo()?;
    git.run(&["config", "tidy.command.testCoverage", "pwd -P"])?;
    std::fs::create_dir_all(git.repo_path.join("subdir"))?;

    let (stdout, _stderr) = git.run(&["-C", "subdir", "tidy", "test-coverage"])?;
    insta::assert_snapshot!(stdout, @r###"
    Running tests with coverage: pwd -P
    <repo-path>
    ✓ Tests with coverage succeeded
    "###);

    Ok(())
}

#[test]
fn test_setup_outside_repository() -> eyre::Result<()> {
    let git = make_git()?;
    let home_dir = tempfile::tempdir()?;
    std::fs::write(
        home_dir.path().join(".gitconfig"),
        "[tidy \"command\"]\n\tsetup = echo setting up\n",
    )?;
    let home = home_dir
        .path()
        .to_str()
        .ok_or_else(|| eyre::eyre!("Could not convert home path to string"))?;

    let (stdout, _stderr) = git.tidy_with_options(
        "setup",
        &[],
        &GitRunOptions {
            env: HashMap::from([("HOME".to_string(), home.to_string())]),
            ..Default::default()
        },
    )?;
    insta::assert_snapshot!(stdout, @r###"
    Running setup: echo setting up
    setting up
    ✓ Setup succeeded
    "###);

    Ok(())
}

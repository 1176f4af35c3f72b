use lib::testing::{make_git, make_git_with_remote_repo, GitRunOptions, GitWrapperWithRemoteRepo};

#[test]
fn test_sync_onto_upstream_main() -> eyre::Result<()> {
    let GitWrapperWithRemoteRepo {
        temp_dir: _guard,
        original_repo,
        cloned_repo,
    } = make_git_with_remote_repo()?;

    original_repo.init_repo()?;
    original_repo.clone_repo_into(&cloned_repo)?;
    cloned_repo.run(&["checkout", "-b", "feature"])?;
    cloned_repo.commit_file("test2", 2)?;
    original_repo.commit_file("upstream1", 1)?;

    {
        let (stdout, _stderr) = cloned_repo.tidy("sync", &[])?;
        insta::assert_snapshot!(stdout, @r###"
        tidy: running command: <git-executable> fetch origin
        tidy: running command: <git-executable> rebase origin/main
        ✓ Synced feature onto origin/main
        "###);
    }

    insta::assert_snapshot!(cloned_repo.log_subjects()?, @r###"
    create test2.txt
    create upstream1.txt
    create initial.txt
    "###);

    {
        let (stdout, _stderr) = cloned_repo.tidy("sync", &[])?;
        insta::assert_snapshot!(stdout, @r###"
        tidy: running command: <git-executable> fetch origin
        ✓ feature is already up to date with origin/main
        "###);
    }

    Ok(())
}

#[test]
fn test_sync_no_fetch() -> eyre::Result<()> {
    let GitWrapperWithRemoteRepo {
        temp_dir: _guard,
        original_repo,
        cloned_repo,
    } = make_git_with_remote_repo()?;

    original_repo.init_repo()?;
    original_repo.clone_repo_into(&cloned_repo)?;
    cloned_repo.run(&["checkout", "-b", "feature"])?;
    cloned_repo.commit_file("test2", 2)?;
    original_repo.commit_file("upstream1", 1)?;

    let (stdout, _stderr) = cloned_repo.tidy("sync", &["--no-fetch"])?;
    insta::assert_snapshot!(stdout, @r###"
    ✓ feature is already up to date with origin/main
    "###);

    insta::assert_snapshot!(cloned_repo.log_subjects()?, @r###"
    create test2.txt
    create initial.txt
    "###);

    Ok(())
}

#[test]
fn test_sync_without_remote() -> eyre::Result<()> {
    let git = make_git()?;
    git.init_repo()?;
    git.run(&["checkout", "-b", "feature"])?;
    git.commit_file("test1", 1)?;
    git.run(&["checkout", "main"])?;
    git.commit_file("test2", 2)?;
    git.run(&["checkout", "feature"])?;

    let (stdout, _stderr) = git.tidy("sync", &[])?;
    insta::assert_snapshot!(stdout, @r###"
    ! No remote named 'origin'; not fetching.
    tidy: running command: <git-executable> rebase main
    ✓ Synced feature onto main
    "###);

    insta::assert_snapshot!(git.log_subjects()?, @r###"
    create test1.txt
    create test2.txt
    create initial.txt
    "###);

    Ok(())
}

#[test]
fn test_sync_conflict() -> eyre::Result<()> {
    let GitWrapperWithRemoteRepo {
        temp_dir: _guard,
        original_repo,
        cloned_repo,
    } = make_git_with_remote_repo()?;

    original_repo.init_repo()?;
    original_repo.clone_repo_into(&cloned_repo)?;
    cloned_repo.run(&["checkout", "-b", "feature"])?;
    cloned_repo.commit_file_with_contents("conflict", 2, "feature contents\n")?;
    original_repo.commit_file_with_contents("conflict", 1, "upstream contents\n")?;

    {
        let (_stdout, stderr) = cloned_repo.tidy_with_options(
            "sync",
            &[],
            &GitRunOptions {
                expected_exit_code: 1,
                ..Default::default()
            },
        )?;
        assert!(
            stderr.contains("X Could not rebase feature onto origin/main.\nResolve the conflicts and run `git rebase --continue`, or run `git rebase --abort` to undo the sync.\n"),
            "{stderr}"
        );
    }

    {
        let (_stdout, stderr) = cloned_repo.tidy_with_options(
            "sync",
            &[],
            &GitRunOptions {
                expected_exit_code: 1,
                ..Default::default()
            },
        )?;
        insta::assert_snapshot!(stderr, @r###"
        X A rebase is in progress. Finish or abort it before continuing.
        "###);
    }

    cloned_repo.run(&["rebase", "--abort"])?;
    insta::assert_snapshot!(cloned_repo.log_subjects()?, @r###"
    create conflict.txt
    create initial.txt
    "###);

    Ok(())
}

#[test]
fn test_sync_missing_main_branch() -> eyre::Result<()> {
    let git = make_git()?;
    git.init_repo()?;
    git.run(&["checkout", "-b", "feature"])?;
    git.run(&["config", "tidy.mainBranch", "trunk"])?;

    let (_stdout, stderr) = git.tidy_with_options(
        "sync",
        &["--no-fetch"],
        &GitRunOptions {
            expected_exit_code: 1,
            ..Default::default()
        },
    )?;
    insta::assert_snapshot!(stderr, @r###"
    X Could not find the main branch 'trunk', locally or on the upstream remote. Set it with: git config tidy.mainBranch <name>
    "###);

    Ok(())
}

mod commands;

fn main() {
    git_tidy_invoke::invoke_subcommand_main(commands::command_main)
}

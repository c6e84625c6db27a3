fn main() -> std::process::ExitCode {
    todo_sync_lib::run()
}

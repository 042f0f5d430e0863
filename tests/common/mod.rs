use assert_cmd::Command;

pub fn schedule_bot_bin() -> Command {
    #[allow(deprecated)]
    {
        Command::cargo_bin("schedule-bot").expect("schedule-bot test binary should build")
    }
}

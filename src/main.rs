fn main() -> anyhow::Result<()> {
    mindscribe::cli::run()
}

mod cli;
mod human;
mod report;

fn main() {
    cli::main();
}

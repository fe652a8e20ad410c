pub fn run(code: &str) -> i32 {
    let ir = super::parse_or_exit(code);
    println!("{}", ir.to_json());
    0
}

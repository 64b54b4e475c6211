use std::io::{self, Write};

use log::warn;

use oakdb::engine::{ExecResult, SqlEngine};
use oakdb::sql::ast::SelectAttr;
use oakdb::sql::parser::parse_statement;

fn print_rows(attr: SelectAttr, rows: &[(i32, String)]) {
    match attr {
        SelectAttr::Count => println!("{}", rows.len()),
        SelectAttr::Key => {
            for (key, _) in rows {
                println!("{}", key);
            }
        }
        SelectAttr::Value => {
            for (_, value) in rows {
                println!("{}", value);
            }
        }
        SelectAttr::All => {
            for (key, value) in rows {
                println!("{} '{}'", key, value);
            }
        }
    }
}

fn main() -> io::Result<()> {
    env_logger::init();
    println!("oakdb ready. LOAD <table> FROM '<file>' [WITH INDEX], SELECT ..., QUIT.");

    let engine = SqlEngine::new(".");

    loop {
        print!("oakdb> ");
        io::stdout().flush()?;

        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            break; // EOF
        }
        let input = input.trim();
        if input.is_empty() {
            continue;
        }

        let stmt = match parse_statement(input) {
            Ok(stmt) => stmt,
            Err(e) => {
                eprintln!("{}", e);
                continue;
            }
        };

        match engine.execute(stmt) {
            Ok(ExecResult::Rows(attr, rows)) => print_rows(attr, &rows),
            Ok(ExecResult::Loaded(count)) => println!("loaded {} tuples", count),
            Ok(ExecResult::Quit) => break,
            Err(e) => {
                warn!("statement failed: {}", e);
                eprintln!("error: {}", e);
            }
        }
    }

    Ok(())
}

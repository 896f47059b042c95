use clap::{Parser as ClapParser, Subcommand};
use std::mem::offset_of;

use jrt::{
    ARRAY_HEADER_SIZE, ArrayHeader, HEADER_SIZE, ITable, ITableEntry, OBJECT_ALIGN, Ref, VTable,
    abi::RUNTIME_SYMBOLS,
    config::{self, RuntimeConfig},
    dispatch::table_layout,
    natives::{self, NativeKind},
    unwind::EXCEPTION_CLASS,
};

#[derive(ClapParser, Debug)]
#[command(author, version, about = "Inspect the runtime's ABI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the memory layouts generated code relies on
    Layout,
    /// List exported runtime entry points and native stubs
    Symbols {
        /// Only list native stubs
        #[arg(long, help = "Skip the _Jrt_* entry points")]
        natives_only: bool,
    },
    /// Print the configuration read from the environment
    Config,
}

fn main() {
    config::init_logging();
    let cli = Cli::parse();

    match cli.command {
        Command::Layout => print_layout(),
        Command::Symbols { natives_only } => print_symbols(natives_only),
        Command::Config => print_config(),
    }
}

fn print_layout() {
    println!("reference           {} bytes", size_of::<Ref>());
    println!("  object            +{}", offset_of!(Ref, object));
    println!("  vtable            +{}", offset_of!(Ref, vtable));
    println!("object header       {HEADER_SIZE} bytes, align {OBJECT_ALIGN}");
    println!("array header        {ARRAY_HEADER_SIZE} bytes");
    println!("  length            +{}", offset_of!(ArrayHeader, length));
    println!("  width             +{}", offset_of!(ArrayHeader, width));
    println!("  elements          +{}", offset_of!(ArrayHeader, elements));
    println!("vtable header       {} bytes", size_of::<VTable>());
    println!("itable header       {} bytes", size_of::<ITable>());
    match table_layout(0, 0) {
        Ok(layout) => println!("empty table         {} bytes", layout.size()),
        Err(err) => println!("empty table         {err}"),
    }
    println!("  slot size         {} bytes", size_of::<jrt::MethodPtr>());
    println!("itable entry        {} bytes", size_of::<ITableEntry>());
    println!("  interface         +{}", offset_of!(ITableEntry, interface));
    println!("  offset            +{}", offset_of!(ITableEntry, offset));
    println!("vtable align        {}", align_of::<VTable>());
    println!("exception class     {EXCEPTION_CLASS:#010x}");
}

fn print_symbols(natives_only: bool) {
    if !natives_only {
        for symbol in RUNTIME_SYMBOLS {
            println!("{symbol}");
        }
    }
    for native in natives::natives() {
        let kind = match native.kind {
            NativeKind::Function => "fn",
            NativeKind::Data => "data",
        };
        println!("{:<4} {:<44} {}", kind, native.name, native.symbol);
    }
}

fn print_config() {
    match RuntimeConfig::from_env() {
        Ok(config) => println!("{config:#?}"),
        Err(err) => {
            eprintln!("invalid configuration: {err}");
            std::process::exit(1);
        }
    }
}

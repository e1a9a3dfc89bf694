use clap::{builder::{EnumValueParser, PossibleValue, TypedValueParser, ValueParserFactory}, ValueEnum};

/// Value of `--threads`: how many mirrors are kept and how many tasks may
/// run at the same time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ThreadsConfig {
    Named(NamedThreadConfig),
    Num(usize),
}

impl Default for ThreadsConfig {
    fn default() -> Self {
        ThreadsConfig::Num(1)
    }
}

impl ThreadsConfig {
    pub fn get_num_threads(self) -> usize {
        match self {
            ThreadsConfig::Named(NamedThreadConfig::Cpu) => num_cpus::get(),
            ThreadsConfig::Named(NamedThreadConfig::Physical) => num_cpus::get_physical(),
            ThreadsConfig::Num(n) => n,
        }
        .max(1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[derive(ValueEnum)]
pub enum NamedThreadConfig {
    /// One mirror per logical CPU.
    Cpu,
    /// One mirror per physical CPU.
    Physical,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadsValueParser;

impl ValueParserFactory for ThreadsConfig {
    type Parser = ThreadsValueParser;

    fn value_parser() -> Self::Parser {
        ThreadsValueParser
    }
}

impl TypedValueParser for ThreadsValueParser {
    type Value = ThreadsConfig;

    fn parse_ref(
        &self,
        cmd: &clap::Command,
        arg: Option<&clap::Arg>,
        value: &std::ffi::OsStr,
    ) -> Result<Self::Value, clap::Error> {
        let named = EnumValueParser::<NamedThreadConfig>::new().parse_ref(cmd, arg, value);
        let enum_error = match named {
            Ok(named) => return Ok(ThreadsConfig::Named(named)),
            Err(e) => e,
        };
        clap::value_parser!(u64)
            .range(1..)
            .parse_ref(cmd, arg, value)
            .map(|n| ThreadsConfig::Num(n as usize))
            .map_err(|num_error| {
                clap::Error::raw(
                    clap::error::ErrorKind::InvalidValue,
                    format!("Invalid thread count: not a named value ({enum_error}) or a positive number ({num_error})"),
                )
                .with_cmd(cmd)
            })
    }

    fn possible_values(&self) -> Option<Box<dyn Iterator<Item = PossibleValue> + '_>> {
        let named = NamedThreadConfig::value_variants()
            .iter()
            .filter_map(ValueEnum::to_possible_value);
        let it = named.chain(std::iter::once(PossibleValue::new("<number>").help("A specific number of mirrors")));
        Some(Box::new(it))
    }
}

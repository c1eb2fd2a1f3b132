//! Command-line interface. Each subcommand starts one service or runs a
//! one-shot maintenance task.

use clap::{Parser, Subcommand, ValueEnum};

use crate::db::Table;

/// Inkpost - blog and user account services
#[derive(Parser, Debug)]
#[command(name = "inkpost")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Run the blog service
    Blog,

    /// Run the user account service
    #[command(alias = "user")]
    Users,

    /// Create the tables of one service and exit
    Schema {
        #[arg(long, value_enum)]
        service: Service,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Service {
    Blog,
    Users,
}

impl Service {
    /// Tables the service owns.
    #[must_use]
    pub const fn tables(self) -> &'static [Table] {
        match self {
            Self::Blog => &[Table::Posts, Table::Users],
            Self::Users => &[Table::Users],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_subcommands() {
        let cli = Cli::try_parse_from(["inkpost", "blog"]).unwrap();
        assert_eq!(cli.command, Commands::Blog);

        let cli = Cli::try_parse_from(["inkpost", "schema", "--service", "users"]).unwrap();
        assert_eq!(
            cli.command,
            Commands::Schema {
                service: Service::Users
            }
        );

        assert!(Cli::try_parse_from(["inkpost"]).is_err());
        assert!(Cli::try_parse_from(["inkpost", "schema", "--service", "mail"]).is_err());
    }

    #[test]
    fn test_blog_tables_include_users_for_database_accounts() {
        assert!(Service::Blog.tables().contains(&Table::Users));
        assert_eq!(Service::Users.tables(), &[Table::Users]);
    }
}

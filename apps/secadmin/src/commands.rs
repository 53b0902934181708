//! Subcommand handlers.

use anyhow::{Context, Result, bail};
use clap::{Args, Subcommand};
use security_admin::domain::StateMutation;
use security_admin::{CommitPlan, Permission, PermissionState, PrincipalKey, Service, StateAddress};
use serde_json::json;

/// Output switches shared by every command.
#[derive(Clone, Copy)]
pub struct Output {
    pub json: bool,
}

#[derive(Args)]
pub struct ChangeArgs {
    /// URN of the securable
    #[arg(long)]
    on: String,
    /// Grantee name
    #[arg(long)]
    to: String,
    /// Permission name, e.g. SELECT or "CREATE TABLE"
    #[arg(short, long)]
    permission: String,
    /// Apply to a column of the securable
    #[arg(long)]
    column: Option<String>,
    /// Grantor of the state; defaults to the expected grantor
    #[arg(long)]
    grantor: Option<String>,
    /// Print the planned calls without issuing them
    #[arg(long)]
    dry_run: bool,
}

#[derive(Clone, Copy)]
pub enum Change {
    Grant { with_grant: bool },
    Deny,
    Revoke,
}

impl Change {
    fn mutation(self) -> StateMutation {
        match self {
            Self::Grant { with_grant } => StateMutation::ToggleGrant { with_grant },
            Self::Deny => StateMutation::ToggleDeny,
            Self::Revoke => StateMutation::Revoke,
        }
    }
}

#[derive(Subcommand)]
pub enum RoleCommand {
    /// Show owner, schemas and members of a role
    Show {
        name: String,
        /// Database role in this database; server role when omitted
        #[arg(long)]
        database: Option<String>,
    },
    /// Add a member to a role
    AddMember {
        name: String,
        member: String,
        #[arg(long)]
        database: Option<String>,
    },
    /// Remove a member from a role
    RemoveMember {
        name: String,
        member: String,
        #[arg(long)]
        database: Option<String>,
    },
}

fn print_state(state: &PermissionState, indent: usize) {
    let pad = " ".repeat(indent);
    let marker = if state.state_changed() { " *" } else { "" };
    println!(
        "{pad}{} (grantor {}): {}{marker}",
        state.permission(),
        state.grantor(),
        state.display_state()
    );
    for child in state.children() {
        println!("{pad}  column {}: {}", child.securable().name, child.display_state());
    }
}

pub async fn show_securable(
    service: &Service,
    urn: &str,
    principal: Option<&str>,
    out: Output,
) -> Result<()> {
    let mut securable = service.open_securable(urn).await?;
    service.load_securable_principals(&mut securable).await?;
    if let Some(name) = principal
        && !securable.principals().any(|e| e.principal.name == name)
    {
        service.add_principal_to_securable(&mut securable, name).await?;
    }

    let entries = securable
        .principals()
        .filter(|e| principal.is_none_or(|name| e.principal.name == name));
    if out.json {
        let view: Vec<_> = entries
            .map(|e| {
                json!({
                    "principal": e.principal.name,
                    "type": e.principal.principal_type,
                    "states": e.states.iter().collect::<Vec<_>>(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&view)?);
        return Ok(());
    }

    println!("{} {}", securable.securable_type(), securable.urn());
    for entry in entries {
        println!("{} ({})", entry.principal.name, entry.principal.principal_type);
        for state in entry.states.iter() {
            print_state(state, 2);
        }
    }
    Ok(())
}

pub async fn show_principal(
    service: &Service,
    name: &str,
    database: Option<&str>,
    out: Output,
) -> Result<()> {
    let mut principal = service.open_principal(name, database).await?;
    service.load_principal_securables(&mut principal).await?;

    if out.json {
        let view: Vec<_> = principal
            .securables()
            .map(|e| {
                json!({
                    "securable": e.securable.urn(),
                    "type": e.securable.securable_type(),
                    "states": e.states.iter().collect::<Vec<_>>(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&view)?);
        return Ok(());
    }

    println!("{} ({})", principal.name(), principal.principal_type());
    for key in principal.securables_in_display_order() {
        let Some(entry) = principal.securable(key) else {
            continue;
        };
        println!("{} {}", entry.securable.securable_type(), entry.securable.urn());
        for state in entry.states.iter() {
            print_state(state, 2);
        }
    }
    Ok(())
}

pub async fn change(service: &Service, args: &ChangeArgs, change: Change, out: Output) -> Result<()> {
    let permission = Permission::by_name(&args.permission)
        .with_context(|| format!("unknown permission '{}'", args.permission))?;

    let mut securable = service.open_securable(&args.on).await?;
    service.load_securable_principals(&mut securable).await?;
    let tracked = securable
        .principals()
        .find(|e| e.principal.name == args.to)
        .map(|e| PrincipalKey::from_info(&e.principal));
    let key = if let Some(key) = tracked {
        key
    } else {
        service.add_principal_to_securable(&mut securable, &args.to).await?
    };

    let grantor = args
        .grantor
        .clone()
        .or_else(|| securable.expected_grantor().map(str::to_owned))
        .or_else(|| service.config().default_expected_grantor.clone())
        .context("no grantor given and none expected for this securable")?;
    let mut address = StateAddress::new(permission, grantor);
    if let Some(column) = &args.column {
        address = address.with_column(column.as_str());
    }

    let events = securable.apply(&key, &address, change.mutation())?;
    if events.is_empty() {
        tracing::info!("state unchanged, nothing to commit");
    }

    if args.dry_run {
        let plan = CommitPlan::for_securable(&securable);
        for operation in plan.operations() {
            println!("{operation}");
        }
        return Ok(());
    }

    let log = service.apply_securable_changes(&mut securable).await?;
    if out.json {
        println!("{}", serde_json::to_string_pretty(&log)?);
    } else {
        for operation in log.applied() {
            println!("{operation}");
        }
        println!("{} operation(s) applied", log.total());
    }
    Ok(())
}

pub async fn role(service: &Service, command: &RoleCommand, out: Output) -> Result<()> {
    match command {
        RoleCommand::Show { name, database } => {
            if let Some(db) = database {
                show_database_role(service, db, name, out).await?;
            } else {
                show_server_role(service, name, out).await?;
            }
        }
        RoleCommand::AddMember {
            name,
            member,
            database,
        } => edit_members(service, name, database.as_deref(), member, true, out).await?,
        RoleCommand::RemoveMember {
            name,
            member,
            database,
        } => edit_members(service, name, database.as_deref(), member, false, out).await?,
    }
    Ok(())
}

async fn show_database_role(service: &Service, database: &str, name: &str, out: Output) -> Result<()> {
    let role = service.open_database_role(database, name).await?;
    if out.json {
        let view = json!({
            "database": role.database(),
            "name": role.name(),
            "owner": role.owner(),
            "owned_schemas": role.owned_schemas().collect::<Vec<_>>(),
            "members": role.members().collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&view)?);
    } else {
        println!("{}.{} owner {}", role.database(), role.name(), role.owner().unwrap_or("-"));
        println!("schemas: {}", role.owned_schemas().collect::<Vec<_>>().join(", "));
        println!("members: {}", role.members().collect::<Vec<_>>().join(", "));
    }
    Ok(())
}

async fn show_server_role(service: &Service, name: &str, out: Output) -> Result<()> {
    let role = service.open_server_role(name).await?;
    if out.json {
        let view = json!({
            "name": role.name(),
            "fixed": role.is_fixed(),
            "owner": role.owner(),
            "members": role.members().collect::<Vec<_>>(),
            "memberships": role.memberships().collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&view)?);
    } else {
        let fixed = if role.is_fixed() { " (fixed)" } else { "" };
        println!("{}{fixed} owner {}", role.name(), role.owner().unwrap_or("-"));
        println!("members: {}", role.members().collect::<Vec<_>>().join(", "));
        println!("member of: {}", role.memberships().collect::<Vec<_>>().join(", "));
    }
    Ok(())
}

async fn edit_members(
    service: &Service,
    name: &str,
    database: Option<&str>,
    member: &str,
    add: bool,
    out: Output,
) -> Result<()> {
    let operations = if let Some(db) = database {
        let mut role = service.open_database_role(db, name).await?;
        let changed = if add {
            role.add_member(member)
        } else {
            role.remove_member(member)
        };
        if !changed {
            bail!("'{member}' membership of '{name}' is already as requested");
        }
        service.apply_database_role(&mut role).await?
    } else {
        let mut role = service.open_server_role(name).await?;
        let changed = if add {
            role.add_member(member)
        } else {
            role.remove_member(member)
        };
        if !changed {
            bail!("'{member}' membership of '{name}' is already as requested");
        }
        service.apply_server_role(&mut role).await?
    };

    if out.json {
        println!("{}", serde_json::to_string_pretty(&operations)?);
    } else {
        println!("{} role operation(s) applied", operations.len());
    }
    Ok(())
}

//! Thin built-ins over the kernel's job operations.
//!
//! The dispatcher follows the launcher's contract: `Some(code)` when
//! the words named a built-in that ran here, `None` to run an external
//! program. Only a single, non-piped, foreground invocation reaches
//! this dispatcher from the shell's own process; inside a pipeline it
//! runs in the forked stage.

use std::env;

use jsh_kernel::{find_job, report, resume, terminate, Outcome, StateFilter};

pub fn dispatch(words: &[String]) -> Option<i32> {
    let name = words.first()?;
    match name.as_str() {
        "cd" => Some(cd(&words[1..])),
        "jobs" => Some(jobs()),
        "fg" => Some(resume_job("fg", &words[1..], true)),
        "bg" => Some(resume_job("bg", &words[1..], false)),
        "kill" => Some(kill(&words[1..])),
        _ => None,
    }
}

fn cd(args: &[String]) -> i32 {
    let Some(target) = args.first().cloned().or_else(|| env::var("HOME").ok()) else {
        eprintln!("cd: no directory");
        return 1;
    };
    match env::set_current_dir(&target) {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("cd: {target}: {e}");
            1
        }
    }
}

fn jobs() -> i32 {
    for job in report(StateFilter::All) {
        println!("{job}");
    }
    0
}

/// `fg [n]` / `bg [n]`: default to the most recent background job.
fn resume_job(name: &str, args: &[String], foreground: bool) -> i32 {
    let index = match job_index(args) {
        Ok(index) => index,
        Err(bad) => {
            eprintln!("{name}: invalid job reference: {bad}");
            return 1;
        }
    };
    let Some((id, command)) = find_job(index) else {
        eprintln!("{name}: no such job");
        return 1;
    };
    println!("[{id}] continue '{command}'");
    match resume(id, foreground) {
        Ok(Outcome::Exited(code)) => code,
        Ok(Outcome::Stopped(job)) => {
            println!("{job}");
            0
        }
        Ok(Outcome::Background(_)) => 0,
        Err(e) => {
            eprintln!("{name}: {e}");
            1
        }
    }
}

fn kill(args: &[String]) -> i32 {
    let index = match job_index(args) {
        Ok(index) => index,
        Err(bad) => {
            eprintln!("kill: invalid job reference: {bad}");
            return 1;
        }
    };
    let Some((id, _)) = find_job(index) else {
        eprintln!("kill: no such job");
        return 1;
    };
    match terminate(id) {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("kill: {e}");
            1
        }
    }
}

/// Accepts `3` or `%3`; `None` means "most recent".
fn job_index(args: &[String]) -> Result<Option<usize>, String> {
    match args.first() {
        None => Ok(None),
        Some(arg) => arg
            .trim_start_matches('%')
            .parse::<usize>()
            .map(Some)
            .map_err(|_| arg.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn unknown_commands_fall_through_to_exec() {
        assert_eq!(dispatch(&words(&["ls", "-l"])), None);
        assert_eq!(dispatch(&[]), None);
    }

    #[test]
    fn job_references_accept_percent_prefix() {
        assert_eq!(job_index(&words(&["%2"])), Ok(Some(2)));
        assert_eq!(job_index(&words(&["2"])), Ok(Some(2)));
        assert_eq!(job_index(&[]), Ok(None));
        assert!(job_index(&words(&["%x"])).is_err());
    }

    #[test]
    fn cd_changes_the_working_directory() {
        let dir = env::temp_dir();
        assert_eq!(cd(&words(&[dir.to_string_lossy().as_ref()])), 0);
        assert_eq!(
            env::current_dir().unwrap().canonicalize().unwrap(),
            dir.canonicalize().unwrap()
        );
    }

    #[test]
    fn cd_to_a_missing_directory_fails() {
        assert_eq!(cd(&words(&["/definitely/not/here"])), 1);
    }
}

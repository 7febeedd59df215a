use regex::Regex;
use sysinfo::System;

/// 匹配到的候选进程：(PID, PPID)
pub type Candidate = (u32, Option<u32>);

/// 命令行匹配器：优先按正则匹配，正则无效时退化为子串匹配（同时匹配进程名）
pub enum CmdlineMatcher {
    Regex(Regex),
    Substring(String),
}

impl CmdlineMatcher {
    pub fn new(pattern: &str) -> Self {
        match Regex::new(pattern) {
            Ok(r) => CmdlineMatcher::Regex(r),
            Err(_) => CmdlineMatcher::Substring(pattern.to_string()),
        }
    }

    pub fn is_match(&self, cmdline: &str, name: &str) -> bool {
        match self {
            CmdlineMatcher::Regex(r) => r.is_match(cmdline),
            CmdlineMatcher::Substring(s) => cmdline.contains(s.as_str()) || name.contains(s.as_str()),
        }
    }
}

/// 在已刷新的进程表中找出所有匹配的进程
pub fn matching_candidates(sys: &System, matcher: &CmdlineMatcher) -> Vec<Candidate> {
    let mut candidates: Vec<Candidate> = sys
        .processes()
        .iter()
        .filter_map(|(pid, process)| {
            let process_cmd = process
                .cmd()
                .iter()
                .map(|s| s.to_string_lossy())
                .collect::<Vec<_>>()
                .join(" ");
            let process_name = process.name().to_string_lossy();

            matcher
                .is_match(&process_cmd, &process_name)
                .then(|| (pid.as_u32(), process.parent().map(|p| p.as_u32())))
        })
        .collect();
    candidates.sort();
    candidates
}

/// 从候选进程中选出主进程
///
/// 对于多进程应用（如 node cluster、Java），会返回主进程的 PID
///
/// 策略优先级：
/// 1. PPID = 1 的进程（systemd 直接启动）
/// 2. PPID 不在匹配列表中的进程（父进程，非子进程）
/// 3. 最小 PID（通常是最早创建的主进程）
pub fn pick_main_pid(candidates: &[Candidate]) -> Option<u32> {
    if candidates.len() <= 1 {
        return candidates.first().map(|(pid, _)| *pid);
    }

    // 策略1: 找 PPID = 1 的进程
    if let Some((pid, _)) = candidates.iter().find(|(_, ppid)| *ppid == Some(1)) {
        log::debug!("Found main process (PPID=1): PID {}", pid);
        return Some(*pid);
    }

    // 策略2: 父进程不在匹配列表中的进程
    let pids: Vec<u32> = candidates.iter().map(|(pid, _)| *pid).collect();
    if let Some((pid, ppid)) = candidates
        .iter()
        .find(|(_, ppid)| ppid.is_some_and(|p| !pids.contains(&p)))
    {
        log::debug!("Found main process (parent not in group): PID {} (PPID={:?})", pid, ppid);
        return Some(*pid);
    }

    // 策略3: 最小 PID
    let min_pid = pids.iter().min().copied();
    log::debug!("Found main process (min PID fallback): {:?} from {} matches", min_pid, pids.len());
    min_pid
}

pub fn find_main_pid(sys: &System, matcher: &CmdlineMatcher) -> Option<u32> {
    pick_main_pid(&matching_candidates(sys, matcher))
}

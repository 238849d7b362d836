// In-process FTP server for integration tests.
#![allow(dead_code)]

use rouilleftp::ClientConfig;
use std::collections::BTreeMap;
use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};

pub const USERNAME: &str = "demo";
pub const PASSWORD: &str = "password";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Dir,
    File(Vec<u8>),
    Link(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingStyle {
    Unix,
    Windows,
}

#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub banner: String,
    pub system: Option<String>, // None answers SYST with 502
    pub style: ListingStyle,
    pub account: Option<String>, // Asks for ACCT after PASS when set
    pub pasv_unspecified: bool,  // Advertises 0.0.0.0 in PASV replies
    pub stall_transfers: bool,   // Sends a few bytes, then keeps the data connection idle
}

impl ServerOptions {
    pub fn unix() -> Self {
        Self {
            banner: "Mock FTP server ready".to_string(),
            system: Some("UNIX Type: L8".to_string()),
            style: ListingStyle::Unix,
            account: None,
            pasv_unspecified: false,
            stall_transfers: false,
        }
    }

    pub fn windows() -> Self {
        Self {
            banner: "Microsoft FTP Service".to_string(),
            system: Some("Windows_NT".to_string()),
            style: ListingStyle::Windows,
            ..Self::unix()
        }
    }

    /// Says nothing about itself and lists in the Windows dialect.
    pub fn anonymous_windows() -> Self {
        Self {
            banner: "FTP server ready".to_string(),
            system: None,
            style: ListingStyle::Windows,
            ..Self::unix()
        }
    }
}

struct State {
    tree: BTreeMap<String, Node>,
    data_connections: usize,
    commands: Vec<String>,
}

pub struct MockServer {
    address: SocketAddr,
    state: Arc<Mutex<State>>,
}

impl MockServer {
    pub async fn start(options: ServerOptions) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        let state = Arc::new(Mutex::new(State {
            tree: default_tree(),
            data_connections: 0,
            commands: Vec::new(),
        }));

        let shared = state.clone();
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                let options = options.clone();
                let state = shared.clone();
                tokio::spawn(async move {
                    let _ = serve(socket, options, state).await;
                });
            }
        });

        Self { address, state }
    }

    pub fn port(&self) -> u16 {
        self.address.port()
    }

    /// Configuration with valid credentials and a short timeout.
    pub fn config(&self) -> ClientConfig {
        let mut config =
            ClientConfig::new("127.0.0.1", self.port()).with_credentials(USERNAME, PASSWORD);
        config.timeout_secs = Some(5);
        config
    }

    pub fn data_connections(&self) -> usize {
        self.state.lock().unwrap().data_connections
    }

    /// Command verbs received so far, in order.
    pub fn commands(&self) -> Vec<String> {
        self.state.lock().unwrap().commands.clone()
    }

    pub fn node(&self, path: &str) -> Option<Node> {
        self.state.lock().unwrap().tree.get(path).cloned()
    }

    pub fn insert(&self, path: &str, node: Node) {
        self.state.lock().unwrap().tree.insert(path.to_string(), node);
    }
}

fn default_tree() -> BTreeMap<String, Node> {
    let mut tree = BTreeMap::new();
    tree.insert("/".to_string(), Node::Dir);
    tree.insert("/lib".to_string(), Node::Dir);
    tree.insert("/lib/libc.so".to_string(), Node::File(vec![0x7f; 64]));
    tree.insert("/lib64".to_string(), Node::Link("/lib".to_string()));
    tree.insert("/tmp".to_string(), Node::Dir);
    tree.insert("/tmp/A and B".to_string(), Node::Dir);
    tree.insert("/tmp/C and D".to_string(), Node::File(b"hello".to_vec()));
    tree.insert("/upload".to_string(), Node::Dir);
    tree
}

fn parent_of(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) => "/",
        Some(index) => &path[..index],
        None => "/",
    }
}

fn name_of(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

enum DataSetup {
    Passive(TcpListener),
    Active(SocketAddrV4),
}

impl DataSetup {
    async fn open(self) -> io::Result<TcpStream> {
        match self {
            DataSetup::Passive(listener) => listener.accept().await.map(|(stream, _)| stream),
            DataSetup::Active(address) => TcpStream::connect(address).await,
        }
    }
}

struct Connection {
    options: ServerOptions,
    state: Arc<Mutex<State>>,
    user: Option<String>,
    logged_in: bool,
    cwd: String,
    data: Option<DataSetup>,
    rename_from: Option<String>,
}

async fn reply(writer: &mut OwnedWriteHalf, code: u16, text: &str) -> io::Result<()> {
    writer
        .write_all(format!("{} {}\r\n", code, text).as_bytes())
        .await
}

async fn serve(socket: TcpStream, options: ServerOptions, state: Arc<Mutex<State>>) -> io::Result<()> {
    let (read_half, mut writer) = socket.into_split();
    let mut lines = BufReader::new(read_half).lines();
    let mut connection = Connection {
        options,
        state,
        user: None,
        logged_in: false,
        cwd: "/".to_string(),
        data: None,
        rename_from: None,
    };

    let banner = connection.options.banner.clone();
    reply(&mut writer, 220, &banner).await?;

    while let Some(line) = lines.next_line().await? {
        let (verb, arg) = match line.split_once(' ') {
            Some((verb, arg)) => (verb.to_ascii_uppercase(), arg.to_string()),
            None => (line.to_ascii_uppercase(), String::new()),
        };
        connection.state.lock().unwrap().commands.push(verb.clone());

        if verb == "QUIT" {
            reply(&mut writer, 221, "Goodbye").await?;
            break;
        }
        connection.handle(&verb, &arg, &mut writer).await?;
    }
    Ok(())
}

impl Connection {
    async fn handle(&mut self, verb: &str, arg: &str, w: &mut OwnedWriteHalf) -> io::Result<()> {
        match verb {
            "USER" => {
                self.user = Some(arg.to_string());
                self.logged_in = false;
                return reply(w, 331, "Please specify the password").await;
            }
            "PASS" => {
                if self.user.as_deref() != Some(USERNAME) || arg != PASSWORD {
                    return reply(w, 530, "Login incorrect").await;
                }
                if self.options.account.is_some() {
                    return reply(w, 332, "Need account for login").await;
                }
                self.logged_in = true;
                return reply(w, 230, "Login successful").await;
            }
            "ACCT" => {
                if self.user.as_deref() == Some(USERNAME)
                    && self.options.account.as_deref() == Some(arg)
                {
                    self.logged_in = true;
                    return reply(w, 230, "Login successful").await;
                }
                return reply(w, 530, "Unknown account").await;
            }
            _ if !self.logged_in => return reply(w, 530, "Please login with USER and PASS").await,
            _ => {}
        }

        match verb {
            "SYST" => match self.options.system.clone() {
                Some(system) => reply(w, 215, &system).await,
                None => reply(w, 502, "Command not implemented").await,
            },
            "TYPE" => reply(w, 200, &format!("Type set to {}", arg)).await,
            "NOOP" => reply(w, 200, "NOOP ok").await,
            "PWD" => {
                let text = format!("\"{}\" is the current directory", self.cwd);
                reply(w, 257, &text).await
            }
            "CWD" => {
                let path = self.resolve(arg);
                if self.lookup(&path) == Some(Node::Dir) {
                    self.cwd = path;
                    reply(w, 250, "Directory successfully changed").await
                } else {
                    reply(w, 550, "Failed to change directory").await
                }
            }
            "PASV" => {
                let listener = TcpListener::bind("127.0.0.1:0").await?;
                let port = listener.local_addr()?.port();
                let host = if self.options.pasv_unspecified {
                    "0,0,0,0"
                } else {
                    "127,0,0,1"
                };
                self.data = Some(DataSetup::Passive(listener));
                let text = format!("Entering Passive Mode ({},{},{}).", host, port >> 8, port & 0xff);
                reply(w, 227, &text).await
            }
            "PORT" => match parse_port(arg) {
                Some(address) => {
                    self.data = Some(DataSetup::Active(address));
                    reply(w, 200, "PORT command successful").await
                }
                None => reply(w, 501, "Illegal PORT command").await,
            },
            "LIST" => {
                let path = self.resolve(arg);
                match self.render_listing(&path) {
                    Some(lines) => {
                        let payload = lines
                            .iter()
                            .map(|line| format!("{}\r\n", line))
                            .collect::<String>();
                        self.send_data(w, payload.into_bytes()).await
                    }
                    None => {
                        self.data = None;
                        reply(w, 550, "No such file or directory").await
                    }
                }
            }
            "STAT" if arg.is_empty() => reply(w, 211, "Mock server status").await,
            "STAT" => {
                let path = self.resolve(arg);
                match self.render_listing(&path) {
                    Some(lines) => {
                        let mut text = format!("213-Status of {}:\r\n", path);
                        for line in lines {
                            text.push_str(&line);
                            text.push_str("\r\n");
                        }
                        text.push_str("213 End of status\r\n");
                        w.write_all(text.as_bytes()).await
                    }
                    None => reply(w, 550, "No such file or directory").await,
                }
            }
            "RETR" => {
                let path = self.resolve(arg);
                match self.lookup(&path) {
                    Some(Node::File(content)) => self.send_data(w, content).await,
                    _ => {
                        self.data = None;
                        reply(w, 550, "Failed to open file").await
                    }
                }
            }
            "STOR" => {
                let path = self.resolve(arg);
                if self.lookup(parent_of(&path)) != Some(Node::Dir)
                    || self.lookup(&path) == Some(Node::Dir)
                {
                    self.data = None;
                    return reply(w, 553, "Could not create file").await;
                }
                self.receive_data(w, &path).await
            }
            "DELE" => {
                let path = self.resolve(arg);
                match self.lookup(&path) {
                    Some(Node::File(_)) | Some(Node::Link(_)) => {
                        self.remove(&path);
                        reply(w, 250, "Delete operation successful").await
                    }
                    _ => reply(w, 550, "Delete operation failed").await,
                }
            }
            "MKD" => {
                let path = self.resolve(arg);
                if self.lookup(parent_of(&path)) == Some(Node::Dir) && self.lookup(&path).is_none() {
                    self.state
                        .lock()
                        .unwrap()
                        .tree
                        .insert(path.clone(), Node::Dir);
                    reply(w, 257, &format!("\"{}\" created", path)).await
                } else {
                    reply(w, 550, "Create directory operation failed").await
                }
            }
            "RMD" => {
                let path = self.resolve(arg);
                if self.lookup(&path) == Some(Node::Dir) && self.children(&path).is_empty() {
                    self.remove(&path);
                    reply(w, 250, "Remove directory operation successful").await
                } else {
                    reply(w, 550, "Remove directory operation failed").await
                }
            }
            "RNFR" => {
                let path = self.resolve(arg);
                if self.lookup(&path).is_some() {
                    self.rename_from = Some(path);
                    reply(w, 350, "Ready for RNTO").await
                } else {
                    reply(w, 550, "RNFR command failed").await
                }
            }
            "RNTO" => {
                let target = self.resolve(arg);
                match self.rename_from.take() {
                    Some(source) if self.lookup(parent_of(&target)) == Some(Node::Dir) => {
                        self.move_tree(&source, &target);
                        reply(w, 250, "Rename successful").await
                    }
                    Some(_) => reply(w, 553, "Rename failed").await,
                    None => reply(w, 503, "RNFR required first").await,
                }
            }
            _ => reply(w, 502, "Command not implemented").await,
        }
    }

    fn resolve(&self, arg: &str) -> String {
        let joined = if arg.is_empty() || arg == "." {
            self.cwd.clone()
        } else if arg.starts_with('/') {
            arg.to_string()
        } else if self.cwd == "/" {
            format!("/{}", arg)
        } else {
            format!("{}/{}", self.cwd, arg)
        };
        let trimmed = joined.trim_end_matches('/');
        if trimmed.is_empty() {
            "/".to_string()
        } else {
            trimmed.to_string()
        }
    }

    fn lookup(&self, path: &str) -> Option<Node> {
        self.state.lock().unwrap().tree.get(path).cloned()
    }

    fn remove(&self, path: &str) {
        self.state.lock().unwrap().tree.remove(path);
    }

    fn children(&self, dir: &str) -> Vec<(String, Node)> {
        self.state
            .lock()
            .unwrap()
            .tree
            .iter()
            .filter(|(path, _)| path.as_str() != "/" && parent_of(path) == dir)
            .map(|(path, node)| (name_of(path).to_string(), node.clone()))
            .collect()
    }

    fn move_tree(&self, source: &str, target: &str) {
        let mut state = self.state.lock().unwrap();
        let prefix = format!("{}/", source);
        let moved: Vec<String> = state
            .tree
            .keys()
            .filter(|path| path.as_str() == source || path.starts_with(&prefix))
            .cloned()
            .collect();
        for path in moved {
            if let Some(node) = state.tree.remove(&path) {
                let renamed = format!("{}{}", target, &path[source.len()..]);
                state.tree.insert(renamed, node);
            }
        }
    }

    fn render_listing(&self, path: &str) -> Option<Vec<String>> {
        let node = self.lookup(path)?;
        let style = self.options.style;
        if node != Node::Dir {
            return Some(vec![render_line(style, name_of(path), &node)]);
        }

        let children = self.children(path);
        let mut lines = Vec::new();
        if style == ListingStyle::Unix {
            lines.push(format!("total {}", children.len() * 4));
            lines.push(render_line(style, ".", &Node::Dir));
            lines.push(render_line(style, "..", &Node::Dir));
        }
        for (name, node) in &children {
            lines.push(render_line(style, name, node));
        }
        Some(lines)
    }

    async fn send_data(&mut self, w: &mut OwnedWriteHalf, payload: Vec<u8>) -> io::Result<()> {
        let Some(setup) = self.data.take() else {
            return reply(w, 425, "Use PORT or PASV first").await;
        };
        reply(w, 150, "Opening data connection").await?;
        let mut data = match setup.open().await {
            Ok(data) => data,
            Err(_) => return reply(w, 425, "Failed to establish connection").await,
        };
        self.state.lock().unwrap().data_connections += 1;

        if self.options.stall_transfers {
            let _ = data.write_all(&payload[..payload.len().min(3)]).await;
            tokio::time::sleep(Duration::from_secs(60)).await;
        }

        let sent = async {
            data.write_all(&payload).await?;
            data.shutdown().await
        }
        .await;
        drop(data);
        match sent {
            Ok(()) => reply(w, 226, "Transfer complete").await,
            Err(_) => reply(w, 426, "Connection closed; transfer aborted").await,
        }
    }

    async fn receive_data(&mut self, w: &mut OwnedWriteHalf, path: &str) -> io::Result<()> {
        let Some(setup) = self.data.take() else {
            return reply(w, 425, "Use PORT or PASV first").await;
        };
        reply(w, 150, "Ok to send data").await?;
        let mut data = match setup.open().await {
            Ok(data) => data,
            Err(_) => return reply(w, 425, "Failed to establish connection").await,
        };
        self.state.lock().unwrap().data_connections += 1;

        let mut content = Vec::new();
        match data.read_to_end(&mut content).await {
            Ok(_) => {
                self.state
                    .lock()
                    .unwrap()
                    .tree
                    .insert(path.to_string(), Node::File(content));
                reply(w, 226, "Transfer complete").await
            }
            Err(_) => reply(w, 426, "Connection closed; transfer aborted").await,
        }
    }
}

fn render_line(style: ListingStyle, name: &str, node: &Node) -> String {
    match (style, node) {
        (ListingStyle::Unix, Node::Dir) => {
            format!("drwxr-xr-x    2 1001     1001         4096 Jan 21  2019 {}", name)
        }
        (ListingStyle::Unix, Node::File(content)) => format!(
            "-rw-r--r--    1 1001     1001     {:>8} Mar 14  2021 {}",
            content.len(),
            name
        ),
        (ListingStyle::Unix, Node::Link(target)) => format!(
            "lrwxrwxrwx    1 0        0        {:>8} Sep 03  2009 {} -> {}",
            target.len(),
            name,
            target
        ),
        (ListingStyle::Windows, Node::Dir) => {
            format!("04-04-15  12:12PM       <DIR>          {}", name)
        }
        (ListingStyle::Windows, Node::File(content)) => {
            format!("03-14-21  09:30AM       {:>14} {}", content.len(), name)
        }
        (ListingStyle::Windows, Node::Link(target)) => {
            format!("03-14-21  09:30AM       {:>14} {}", target.len(), name)
        }
    }
}

fn parse_port(arg: &str) -> Option<SocketAddrV4> {
    let numbers: Vec<u8> = arg
        .split(',')
        .map(|part| part.trim().parse().ok())
        .collect::<Option<Vec<u8>>>()?;
    if numbers.len() != 6 {
        return None;
    }
    let ip = Ipv4Addr::new(numbers[0], numbers[1], numbers[2], numbers[3]);
    let port = u16::from(numbers[4]) * 256 + u16::from(numbers[5]);
    Some(SocketAddrV4::new(ip, port))
}

// ABOUTME: Anti-fingerprinting material for the headless browser backend.
// ABOUTME: Launch flags, navigator spoofing scripts and well-known browser install locations.

#![cfg_attr(not(feature = "browser"), allow(dead_code))]

/// Scripts registered to run before any page script on every new document.
pub(crate) const STEALTH_SCRIPTS: &[&str] = &[
    // navigator.webdriver
    r#"
    Object.defineProperty(Navigator.prototype, 'webdriver', {
        get: () => false,
        configurable: true
    });
    "#,
    // window.chrome is missing in headless builds
    r#"
    if (!window.chrome) {
        window.chrome = { runtime: {}, app: { isInstalled: false }, csi: function() {}, loadTimes: function() {} };
    }
    "#,
    r#"
    const queryPermission = window.navigator.permissions.query.bind(window.navigator.permissions);
    window.navigator.permissions.query = (params) => (
        params && params.name === 'notifications'
            ? Promise.resolve({ state: Notification.permission })
            : queryPermission(params)
    );
    "#,
    r#"
    Object.defineProperty(navigator, 'plugins', {
        get: () => [
            { name: 'PDF Viewer', filename: 'internal-pdf-viewer', description: 'Portable Document Format' },
            { name: 'Chrome PDF Viewer', filename: 'internal-pdf-viewer', description: 'Portable Document Format' },
            { name: 'Chromium PDF Viewer', filename: 'internal-pdf-viewer', description: 'Portable Document Format' }
        ],
        configurable: true
    });
    "#,
    r#"
    Object.defineProperty(navigator, 'languages', {
        get: () => ['en-US', 'en'],
        configurable: true
    });
    "#,
    r#"
    Object.defineProperty(navigator, 'hardwareConcurrency', { get: () => 8, configurable: true });
    Object.defineProperty(navigator, 'deviceMemory', { get: () => 8, configurable: true });
    "#,
    // chromedriver leaves cdc_ globals behind
    r#"
    for (const key of Object.keys(window)) {
        if (key.startsWith('cdc_')) {
            delete window[key];
        }
    }
    "#,
    r#"
    const getParameter = WebGLRenderingContext.prototype.getParameter;
    WebGLRenderingContext.prototype.getParameter = function(parameter) {
        if (parameter === 37445) return 'Intel Inc.';
        if (parameter === 37446) return 'Intel Iris OpenGL Engine';
        return getParameter.call(this, parameter);
    };
    "#,
];

/// Chromium flags that hide automation markers and keep headless runs lean.
pub(crate) const LAUNCH_ARGS: &[&str] = &[
    "--disable-blink-features=AutomationControlled",
    "--disable-infobars",
    "--disable-dev-shm-usage",
    "--no-first-run",
    "--no-default-browser-check",
    "--disable-background-networking",
    "--disable-sync",
    "--disable-translate",
    "--mute-audio",
    "--no-sandbox",
    "--disable-gpu",
    "--window-size=1366,768",
    "--lang=en-US",
];

/// Install locations checked before searching PATH.
pub(crate) const CHROME_PATHS: &[&str] = &[
    "/usr/bin/google-chrome",
    "/usr/bin/google-chrome-stable",
    "/usr/bin/chromium",
    "/usr/bin/chromium-browser",
    "/snap/bin/chromium",
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    "/Applications/Chromium.app/Contents/MacOS/Chromium",
    "/opt/google/chrome/google-chrome",
];

/// Executable names searched on PATH.
pub(crate) const CHROME_COMMANDS: &[&str] = &[
    "google-chrome",
    "google-chrome-stable",
    "chromium",
    "chromium-browser",
];
